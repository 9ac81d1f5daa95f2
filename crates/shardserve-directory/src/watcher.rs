//! Membership event subscriber
//!
//! Applies coordination events to the directory one at a time, in delivery
//! order. A rejected report is logged and skipped; the watcher keeps going.

use crate::directory::Directory;
use crate::reaper::VersionReaper;
use shardserve_client::{CoordinationService, MembershipEvent};
use shardserve_common::{NodeAddress, NodeEvent, ServingInfo};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

/// Feeds coordination events into the directory
pub struct MembershipWatcher {
    directory: Arc<Directory>,
    coordination: Arc<dyn CoordinationService>,
    /// Swept whenever the served versions change
    reaper: Option<Arc<VersionReaper>>,
}

impl MembershipWatcher {
    /// Create a watcher that only maintains the directory
    pub fn new(directory: Arc<Directory>, coordination: Arc<dyn CoordinationService>) -> Self {
        Self {
            directory,
            coordination,
            reaper: None,
        }
    }

    /// Also start a background version sweep after every deployment switch
    #[must_use]
    pub fn with_reaper(mut self, reaper: Arc<VersionReaper>) -> Self {
        self.reaper = Some(reaper);
        self
    }

    /// Apply one event
    pub async fn handle(&self, event: MembershipEvent) {
        match event {
            MembershipEvent::Node {
                node,
                serving_info,
                event,
            } => self.reconcile(&node, &serving_info, event),
            MembershipEvent::ServedVersionsChanged => {
                self.sync_served_versions().await;
                if let Some(reaper) = &self.reaper {
                    // Deliveries wait on every live node; keep applying events meanwhile
                    let reaper = reaper.clone();
                    tokio::spawn(async move {
                        reaper.sweep().await;
                    });
                }
            }
        }
    }

    fn reconcile(&self, node: &NodeAddress, serving_info: &ServingInfo, event: NodeEvent) {
        match self.directory.reconcile(node, serving_info, event) {
            Ok(outcome) if !outcome.is_unchanged() => debug!(
                "{} from {}: {} created, {} updated, {} removed",
                event,
                node,
                outcome.created.len(),
                outcome.updated.len(),
                outcome.removed.len()
            ),
            Ok(_) => {}
            Err(e) => error!("Rejected {} from {}: {}", event, node, e),
        }
    }

    /// Copy the served-versions map from the coordination service
    pub async fn sync_served_versions(&self) {
        if let Some(served) = self.coordination.all_served_versions().await {
            self.directory.replace_served_versions(&served);
        }
    }

    /// Rebuild the directory from the coordination service's current state
    ///
    /// Every live node's latest report is applied as an update, and nodes
    /// that are no longer live are dropped from every replica set.
    pub async fn resync(&self) {
        self.sync_served_versions().await;

        let reports = self.coordination.node_reports().await;
        let live: BTreeSet<&NodeAddress> = reports.iter().map(|(node, _)| node).collect();
        for (node, serving_info) in &reports {
            self.reconcile(node, serving_info, NodeEvent::Update);
        }

        let empty = ServingInfo::new();
        for node in self.directory.nodes() {
            if !live.contains(&node) {
                info!("Dropping {} from the directory, no longer live", node);
                self.reconcile(&node, &empty, NodeEvent::Update);
            }
        }
    }

    /// Consume `events` until the stream closes
    pub async fn run(self, mut events: broadcast::Receiver<MembershipEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.handle(event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "Membership watcher missed {} events, resynchronising",
                        skipped
                    );
                    self.resync().await;
                }
                Err(RecvError::Closed) => {
                    info!("Membership event stream closed");
                    break;
                }
            }
        }
    }
}
