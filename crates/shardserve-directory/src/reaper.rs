//! Version reaper
//!
//! Decides which superseded tablespace versions can be dropped and asks
//! every live node to delete them. Delivery is best effort: a node that
//! cannot be reached is reported in the [`SweepReport`] and the versions are
//! offered again on the next sweep, while they remain in the directory.

use crate::directory::Directory;
use crate::metrics;
use shardserve_client::{CoordinationService, NodeClient, NodeError};
use shardserve_common::{NodeAddress, Tablespace, TablespaceVersion};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of delivering the delete batch to one node
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub node: NodeAddress,
    pub result: Result<(), NodeError>,
}

/// What a sweep decided and how delivery went
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Versions scheduled for deletion
    pub removed: Vec<TablespaceVersion>,
    /// One entry per live node the batch was sent to
    pub deliveries: Vec<DeliveryOutcome>,
}

impl SweepReport {
    /// Deliveries that did not succeed
    pub fn failed_deliveries(&self) -> impl Iterator<Item = &DeliveryOutcome> {
        self.deliveries.iter().filter(|d| d.result.is_err())
    }
}

/// Removes tablespace versions older than the retention window
pub struct VersionReaper {
    directory: Arc<Directory>,
    coordination: Arc<dyn CoordinationService>,
    client: Arc<dyn NodeClient>,
    max_versions: usize,
    delete_timeout: Duration,
}

impl VersionReaper {
    /// Create a reaper keeping `max_versions` versions older than the served one
    pub fn new(
        directory: Arc<Directory>,
        coordination: Arc<dyn CoordinationService>,
        client: Arc<dyn NodeClient>,
        max_versions: usize,
        delete_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            coordination,
            client,
            max_versions,
            delete_timeout,
        }
    }

    /// Compute obsolete versions and send one delete batch to every live node
    pub async fn sweep(&self) -> SweepReport {
        let Some(served) = self.coordination.all_served_versions().await else {
            debug!("No served versions yet, skipping sweep");
            return SweepReport::default();
        };

        let removed = select_obsolete(&self.directory.snapshot(), &served, self.max_versions);
        if removed.is_empty() {
            debug!("Sweep found no obsolete versions");
            return SweepReport::default();
        }

        info!(
            "Removing {} obsolete tablespace versions: {:?}",
            removed.len(),
            removed.iter().map(ToString::to_string).collect::<Vec<_>>()
        );
        metrics::record_reaped(removed.len());

        let mut deliveries = Vec::new();
        for node in self.coordination.live_nodes().await {
            let result = self.deliver(&node, &removed).await;
            if let Err(e) = &result {
                warn!("Failed to delete old versions on {}: {}", node, e);
            }
            deliveries.push(DeliveryOutcome { node, result });
        }

        SweepReport {
            removed,
            deliveries,
        }
    }

    async fn deliver(
        &self,
        node: &NodeAddress,
        versions: &[TablespaceVersion],
    ) -> Result<(), NodeError> {
        match tokio::time::timeout(
            self.delete_timeout,
            self.client.delete_old_versions(node, versions),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(NodeError::Timeout),
        }
    }
}

/// Select the versions of each tablespace beyond the retention window
///
/// Versions are ordered newest first by creation date, then by version.
/// Everything newer than the served version is kept, since it may still be
/// rolling out. Of the versions older than the served one, the first
/// `max_versions` are kept and the rest are selected. A tablespace whose
/// served version is not in the directory is left alone.
#[must_use]
pub fn select_obsolete(
    snapshot: &[(TablespaceVersion, Arc<Tablespace>)],
    served: &HashMap<String, i64>,
    max_versions: usize,
) -> Vec<TablespaceVersion> {
    let mut by_tablespace: BTreeMap<&str, Vec<(i64, i64)>> = BTreeMap::new();
    for (key, tablespace) in snapshot {
        by_tablespace
            .entry(key.tablespace.as_str())
            .or_default()
            .push((tablespace.creation_date(), key.version));
    }

    let served: BTreeMap<&str, i64> = served.iter().map(|(name, &v)| (name.as_str(), v)).collect();

    let mut obsolete = Vec::new();
    for (name, current) in served {
        let Some(versions) = by_tablespace.get_mut(name) else {
            warn!(
                "Tablespace {} serves version {} but has no versions in directory",
                name, current
            );
            continue;
        };
        versions.sort_unstable_by(|a, b| b.cmp(a));

        let Some(position) = versions.iter().position(|&(_, v)| v == current) else {
            warn!(
                "Served version {} of tablespace {} not found in directory",
                current, name
            );
            continue;
        };

        obsolete.extend(
            versions[position + 1..]
                .iter()
                .skip(max_versions)
                .map(|&(_, version)| TablespaceVersion::new(name, version)),
        );
    }
    obsolete
}
