//! Cluster directory and reconciliation
//!
//! The directory maps every `(tablespace, version)` to an immutable
//! [`Tablespace`] snapshot. DNode serving reports are folded in by
//! [`Directory::reconcile`], the only mutator, which runs under a single
//! exclusive lock. Readers go through the concurrent map and never block on
//! that lock; they see either the old or the new snapshot of a version,
//! never a half-built one.
//!
//! Reconciliation is staged: both passes build replacement snapshots into a
//! private change set, and nothing is published unless the whole call
//! succeeds.

use crate::metrics;
use dashmap::DashMap;
use parking_lot::Mutex;
use shardserve_common::{
    Error, NodeAddress, NodeEvent, PartitionEntry, PartitionMap, ReplicationEntry, ReplicationMap,
    Result, ServingInfo, Tablespace, TablespaceVersion,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Versions created, updated and removed by one reconciliation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: Vec<TablespaceVersion>,
    pub updated: Vec<TablespaceVersion>,
    pub removed: Vec<TablespaceVersion>,
}

impl ReconcileOutcome {
    /// Whether the directory was left as it was
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Why a version leaves the directory
#[derive(Clone, Copy, Debug)]
enum Removal {
    /// The node stopped reporting it
    Implicit,
    /// The node left the cluster
    Explicit,
}

enum Staged {
    Replace(Arc<Tablespace>),
    Remove(Removal),
}

/// Editable copy of a snapshot, keyed by shard
struct WorkingCopy {
    partitions: BTreeMap<u32, PartitionEntry>,
    replicas: BTreeMap<u32, ReplicationEntry>,
}

impl WorkingCopy {
    const fn empty() -> Self {
        Self {
            partitions: BTreeMap::new(),
            replicas: BTreeMap::new(),
        }
    }

    fn of(tablespace: &Tablespace) -> Self {
        Self {
            partitions: tablespace
                .partition_map()
                .entries()
                .map(|e| (e.shard, e.clone()))
                .collect(),
            replicas: tablespace
                .replication_map()
                .entries()
                .map(|e| (e.shard(), e.clone()))
                .collect(),
        }
    }

    /// Drop `node` from the replica set of `shard`, and the shard itself once empty
    fn remove_replica(&mut self, shard: u32, node: &NodeAddress) {
        if let Some(entry) = self.replicas.get_mut(&shard) {
            entry.remove_node(node);
            if entry.is_empty() {
                self.replicas.remove(&shard);
                self.partitions.remove(&shard);
            }
        }
    }

    fn freeze(self, version: i64, creation_date: i64) -> Tablespace {
        Tablespace::new(
            PartitionMap::from_entries(self.partitions.into_values()),
            ReplicationMap::from_entries(self.replicas.into_values()),
            version,
            creation_date,
        )
    }
}

/// Authoritative in-memory map of the cluster's tablespace versions
pub struct Directory {
    /// Published snapshots
    versions: DashMap<TablespaceVersion, Arc<Tablespace>>,
    /// Advisory served version per tablespace, used for routing
    served: DashMap<String, i64>,
    /// Serializes reconciliations
    reconcile_lock: Mutex<()>,
}

impl Directory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self {
            versions: DashMap::new(),
            served: DashMap::new(),
            reconcile_lock: Mutex::new(()),
        }
    }

    /// Fold the serving report of `node` into the directory
    ///
    /// Pass 1 removes `node` from every replica set it no longer reports.
    /// Pass 2 adds (JOIN/UPDATE) or removes (LEAVE) `node` for every
    /// partition it does report, checking that partition bounds and
    /// deployment dates agree with what other nodes reported.
    ///
    /// On error the directory is left exactly as it was.
    pub fn reconcile(
        &self,
        node: &NodeAddress,
        serving_info: &ServingInfo,
        event: NodeEvent,
    ) -> Result<ReconcileOutcome> {
        let _guard = self.reconcile_lock.lock();

        let mut staged = BTreeMap::new();
        self.stage_implicit_leaves(node, serving_info, &mut staged);
        if let Err(e) = self.stage_reported(node, serving_info, event, &mut staged) {
            metrics::record_reconcile_error();
            return Err(e);
        }

        Ok(self.commit(node, event, staged))
    }

    /// Pass 1: drop `node` from shards it used to serve but no longer reports
    fn stage_implicit_leaves(
        &self,
        node: &NodeAddress,
        serving_info: &ServingInfo,
        staged: &mut BTreeMap<TablespaceVersion, Staged>,
    ) {
        for item in &self.versions {
            let (key, tablespace) = (item.key(), item.value());
            let stale: Vec<u32> = tablespace
                .replication_map()
                .entries()
                .filter(|e| e.contains(node) && !serving_info.serves(key, e.shard()))
                .map(ReplicationEntry::shard)
                .collect();
            if stale.is_empty() {
                continue;
            }

            let mut work = WorkingCopy::of(tablespace);
            for shard in stale {
                work.remove_replica(shard, node);
            }

            let change = if work.replicas.is_empty() {
                Staged::Remove(Removal::Implicit)
            } else {
                Staged::Replace(Arc::new(
                    work.freeze(tablespace.version(), tablespace.creation_date()),
                ))
            };
            staged.insert(key.clone(), change);
        }
    }

    /// Pass 2: apply every partition `node` reports
    fn stage_reported(
        &self,
        node: &NodeAddress,
        serving_info: &ServingInfo,
        event: NodeEvent,
        staged: &mut BTreeMap<TablespaceVersion, Staged>,
    ) -> Result<()> {
        for (key, shards) in serving_info.versions() {
            let existing = match staged.get(&key) {
                Some(Staged::Replace(tablespace)) => Some(tablespace.clone()),
                Some(Staged::Remove(_)) => None,
                None => self.get(&key),
            };
            let mut work = existing
                .as_deref()
                .map_or_else(WorkingCopy::empty, WorkingCopy::of);
            // Every partition of a version shares one deployment date
            let mut deploy_date = existing.as_ref().map(|t| t.creation_date());

            for (&shard, metadata) in shards {
                let expected = *deploy_date.get_or_insert(metadata.deployment_date);
                if expected != metadata.deployment_date {
                    return Err(Error::InconsistentDeployDate {
                        key,
                        shard,
                        expected,
                        actual: metadata.deployment_date,
                    });
                }

                let reported =
                    PartitionEntry::new(shard, metadata.min_key.clone(), metadata.max_key.clone())
                        .with_key_kind(metadata.key_kind);
                let had_partition = match work.partitions.get(&shard) {
                    Some(current) => {
                        if !current.same_bounds(&reported) {
                            return Err(Error::InconsistentPartition {
                                key,
                                existing: current.to_string(),
                                reported: reported.to_string(),
                            });
                        }
                        true
                    }
                    None => {
                        if event != NodeEvent::Leave {
                            if let Err(bound) = reported.key_range() {
                                return Err(Error::InvalidPartitionBound {
                                    key,
                                    shard,
                                    bound: bound.to_string(),
                                    kind: reported.key_kind,
                                });
                            }
                            // One key kind per version
                            if let Some(other) = work
                                .partitions
                                .values()
                                .find(|p| p.key_kind != reported.key_kind)
                            {
                                return Err(Error::InconsistentPartition {
                                    key,
                                    existing: other.to_string(),
                                    reported: reported.to_string(),
                                });
                            }
                            work.partitions.insert(shard, reported);
                        }
                        false
                    }
                };

                if event == NodeEvent::Leave {
                    let Some(entry) = work.replicas.get_mut(&shard) else {
                        continue;
                    };
                    entry.remove_node(node);
                    if entry.is_empty() {
                        work.replicas.remove(&shard);
                        if !had_partition {
                            error!(
                                "Replication entry for {} shard {} has no partition entry; this is very likely a bug",
                                key, shard
                            );
                            return Err(Error::OrphanedReplicationEntry { key, shard });
                        }
                        work.partitions.remove(&shard);
                    }
                } else if let Some(entry) = work.replicas.get_mut(&shard) {
                    entry.add_node(node.clone());
                } else {
                    work.replicas
                        .insert(shard, ReplicationEntry::new(shard, node.clone()));
                }
            }

            if work.replicas.is_empty() {
                if existing.is_some() {
                    staged.insert(key, Staged::Remove(Removal::Explicit));
                }
                continue;
            }

            let rebuilt = work.freeze(key.version, deploy_date.unwrap_or_default());
            if existing.as_deref() != Some(&rebuilt) {
                staged.insert(key, Staged::Replace(Arc::new(rebuilt)));
            }
        }
        Ok(())
    }

    /// Publish staged changes, one whole snapshot per version
    fn commit(
        &self,
        node: &NodeAddress,
        event: NodeEvent,
        staged: BTreeMap<TablespaceVersion, Staged>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        for (key, change) in staged {
            match change {
                Staged::Replace(tablespace) => {
                    if self.versions.insert(key.clone(), tablespace).is_some() {
                        debug!("Updated {} after {} from {}", key, event, node);
                        outcome.updated.push(key);
                    } else {
                        info!("New tablespace version {} reported by {}", key, node);
                        outcome.created.push(key);
                    }
                }
                Staged::Remove(cause) => {
                    if self.versions.remove(&key).is_none() {
                        continue;
                    }
                    match cause {
                        Removal::Implicit => info!(
                            "Removing empty tablespace version {} (implicit leaving from {})",
                            key, node
                        ),
                        Removal::Explicit => info!(
                            "Removing empty tablespace version {} due to explicit leaving from {}",
                            key, node
                        ),
                    }
                    outcome.removed.push(key);
                }
            }
        }
        metrics::set_tablespace_versions(self.versions.len());
        outcome
    }

    /// Publish a snapshot without reconciling
    #[cfg(test)]
    pub(crate) fn insert_snapshot(&self, key: TablespaceVersion, tablespace: Tablespace) {
        self.versions.insert(key, Arc::new(tablespace));
    }

    /// Get the snapshot of a tablespace version
    #[must_use]
    pub fn get(&self, key: &TablespaceVersion) -> Option<Arc<Tablespace>> {
        self.versions.get(key).map(|e| Arc::clone(e.value()))
    }

    /// All snapshots, ordered by tablespace then version
    #[must_use]
    pub fn snapshot(&self) -> Vec<(TablespaceVersion, Arc<Tablespace>)> {
        let mut all: Vec<_> = self
            .versions
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Every node listed in some replica set
    #[must_use]
    pub fn nodes(&self) -> BTreeSet<NodeAddress> {
        self.versions
            .iter()
            .flat_map(|e| {
                e.value()
                    .replication_map()
                    .entries()
                    .flat_map(|r| r.nodes().to_vec())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Number of tablespace versions
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether the directory holds no versions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Version currently served for `tablespace`
    #[must_use]
    pub fn served_version(&self, tablespace: &str) -> Option<i64> {
        self.served.get(tablespace).map(|v| *v)
    }

    /// Set the served version of one tablespace
    pub fn set_served_version(&self, tablespace: impl Into<String>, version: i64) {
        self.served.insert(tablespace.into(), version);
    }

    /// Replace the whole served-versions map
    pub fn replace_served_versions(&self, served: &HashMap<String, i64>) {
        self.served.retain(|tablespace, _| served.contains_key(tablespace));
        for (tablespace, version) in served {
            self.served.insert(tablespace.clone(), *version);
        }
    }

    /// Copy of the served-versions map
    #[must_use]
    pub fn served_versions(&self) -> BTreeMap<String, i64> {
        self.served
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardserve_common::{KeyKind, PartitionKey, PartitionMetadata};

    fn meta(min: Option<&str>, max: Option<&str>, date: i64) -> PartitionMetadata {
        PartitionMetadata::new(min.map(String::from), max.map(String::from), date)
    }

    fn node(name: &str) -> NodeAddress {
        NodeAddress::from(name)
    }

    /// Three shards covering [-inf, 10) [10, 20) [20, +inf)
    fn three_shards(tablespace: &str, version: i64, date: i64) -> ServingInfo {
        ServingInfo::new()
            .with_partition(tablespace, version, 0, meta(None, Some("10"), date))
            .with_partition(tablespace, version, 1, meta(Some("10"), Some("20"), date))
            .with_partition(tablespace, version, 2, meta(Some("20"), None, date))
    }

    #[test]
    fn test_join_creates_version() {
        let directory = Directory::new();
        let outcome = directory
            .reconcile(&node("n1"), &three_shards("ts", 1, 100), NodeEvent::Join)
            .unwrap();

        let key = TablespaceVersion::new("ts", 1);
        assert_eq!(outcome.created, vec![key.clone()]);

        let tablespace = directory.get(&key).unwrap();
        assert_eq!(tablespace.creation_date(), 100);
        assert_eq!(tablespace.partition_map().len(), 3);
        assert_eq!(tablespace.replication_map().total_replicas(), 3);
        assert_eq!(
            tablespace.partition_map().find_partition(&PartitionKey::from("15")),
            Some(1)
        );
    }

    #[test]
    fn test_join_is_idempotent() {
        let directory = Directory::new();
        let report = three_shards("ts", 1, 100);

        directory.reconcile(&node("n1"), &report, NodeEvent::Join).unwrap();
        let before = directory.snapshot();

        let outcome = directory.reconcile(&node("n1"), &report, NodeEvent::Join).unwrap();
        assert!(outcome.is_unchanged());
        assert_eq!(directory.snapshot(), before);
    }

    #[test]
    fn test_second_node_extends_replica_sets() {
        let directory = Directory::new();
        let report = three_shards("ts", 1, 100);
        directory.reconcile(&node("n1"), &report, NodeEvent::Join).unwrap();
        let outcome = directory.reconcile(&node("n2"), &report, NodeEvent::Join).unwrap();

        assert_eq!(outcome.updated, vec![TablespaceVersion::new("ts", 1)]);
        let tablespace = directory.get(&TablespaceVersion::new("ts", 1)).unwrap();
        let entry = tablespace.replication_map().get(1).unwrap();
        assert_eq!(entry.nodes(), &[node("n1"), node("n2")]);
    }

    #[test]
    fn test_implicit_leave_removes_replica() {
        let directory = Directory::new();
        let full = three_shards("ts", 1, 100);
        directory.reconcile(&node("n1"), &full, NodeEvent::Join).unwrap();
        directory.reconcile(&node("n2"), &full, NodeEvent::Join).unwrap();

        // n1 stops serving shard 2
        let partial = ServingInfo::new()
            .with_partition("ts", 1, 0, meta(None, Some("10"), 100))
            .with_partition("ts", 1, 1, meta(Some("10"), Some("20"), 100));
        directory.reconcile(&node("n1"), &partial, NodeEvent::Update).unwrap();

        let tablespace = directory.get(&TablespaceVersion::new("ts", 1)).unwrap();
        assert_eq!(tablespace.replication_map().get(2).unwrap().nodes(), &[node("n2")]);
        assert_eq!(
            tablespace.replication_map().get(1).unwrap().nodes(),
            &[node("n1"), node("n2")]
        );
        assert!(tablespace.partition_map().get(2).is_some());
    }

    #[test]
    fn test_implicit_leave_of_sole_replica_drops_partition_and_version() {
        let directory = Directory::new();
        let report = ServingInfo::new()
            .with_partition("ds", 1, 3, meta(Some("a"), Some("m"), 100))
            .with_partition("ds", 1, 4, meta(Some("m"), None, 100));
        directory.reconcile(&node("n1"), &report, NodeEvent::Join).unwrap();

        let without_3 =
            ServingInfo::new().with_partition("ds", 1, 4, meta(Some("m"), None, 100));
        directory.reconcile(&node("n1"), &without_3, NodeEvent::Update).unwrap();

        let tablespace = directory.get(&TablespaceVersion::new("ds", 1)).unwrap();
        assert!(tablespace.partition_map().get(3).is_none());
        assert!(tablespace.replication_map().get(3).is_none());

        let outcome = directory
            .reconcile(&node("n1"), &ServingInfo::new(), NodeEvent::Update)
            .unwrap();
        assert_eq!(outcome.removed, vec![TablespaceVersion::new("ds", 1)]);
        assert!(directory.is_empty());
    }

    #[test]
    fn test_inconsistent_bounds_rejected_without_mutation() {
        let directory = Directory::new();
        let first = ServingInfo::new().with_partition("ds", 2, 5, meta(Some("a"), Some("m"), 100));
        directory.reconcile(&node("n1"), &first, NodeEvent::Join).unwrap();
        let before = directory.snapshot();

        let second = ServingInfo::new().with_partition("ds", 2, 5, meta(Some("a"), Some("z"), 100));
        let err = directory
            .reconcile(&node("n2"), &second, NodeEvent::Join)
            .unwrap_err();

        assert!(matches!(err, Error::InconsistentPartition { .. }));
        assert!(err.is_inconsistency());
        assert_eq!(directory.snapshot(), before);
    }

    #[test]
    fn test_absent_bound_does_not_match_present_bound() {
        let directory = Directory::new();
        let first = ServingInfo::new().with_partition("ds", 2, 5, meta(Some("a"), None, 100));
        directory.reconcile(&node("n1"), &first, NodeEvent::Join).unwrap();

        let second = ServingInfo::new().with_partition("ds", 2, 5, meta(Some("a"), Some("z"), 100));
        assert!(
            directory
                .reconcile(&node("n2"), &second, NodeEvent::Join)
                .is_err()
        );
    }

    #[test]
    fn test_int_keyed_version_orders_numerically() {
        let directory = Directory::new();
        let report = ServingInfo::new()
            .with_partition("ds", 1, 0, meta(None, Some("10"), 5).with_key_kind(KeyKind::Int))
            .with_partition("ds", 1, 1, meta(Some("10"), Some("20"), 5).with_key_kind(KeyKind::Int))
            .with_partition("ds", 1, 2, meta(Some("20"), None, 5).with_key_kind(KeyKind::Int));
        directory.reconcile(&node("n1"), &report, NodeEvent::Join).unwrap();

        let tablespace = directory.get(&TablespaceVersion::new("ds", 1)).unwrap();
        let map = tablespace.partition_map();
        assert_eq!(map.key_kind(), KeyKind::Int);
        assert_eq!(map.find_partition(&PartitionKey::Int(9)), Some(0));
        assert_eq!(map.find_partition(&PartitionKey::Int(15)), Some(1));
        assert_eq!(map.find_partition(&PartitionKey::Int(100)), Some(2));
    }

    #[test]
    fn test_unparseable_bound_rejected_without_mutation() {
        let directory = Directory::new();
        let report = ServingInfo::new()
            .with_partition("ds", 1, 0, meta(None, Some("10"), 5).with_key_kind(KeyKind::Int))
            .with_partition("ds", 1, 1, meta(Some("ten"), None, 5).with_key_kind(KeyKind::Int));

        let err = directory
            .reconcile(&node("n1"), &report, NodeEvent::Join)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidPartitionBound { shard: 1, ref bound, kind: KeyKind::Int, .. } if bound == "ten"
        ));
        assert!(directory.is_empty());
    }

    #[test]
    fn test_mixed_key_kinds_within_version_rejected() {
        let directory = Directory::new();
        let first = ServingInfo::new()
            .with_partition("ds", 1, 0, meta(None, Some("10"), 5).with_key_kind(KeyKind::Int));
        directory.reconcile(&node("n1"), &first, NodeEvent::Join).unwrap();

        let second = ServingInfo::new().with_partition("ds", 1, 1, meta(Some("10"), None, 5));
        let err = directory
            .reconcile(&node("n2"), &second, NodeEvent::Join)
            .unwrap_err();
        assert!(matches!(err, Error::InconsistentPartition { .. }));
        assert_eq!(directory.nodes(), BTreeSet::from([node("n1")]));
    }

    #[test]
    fn test_inconsistent_deploy_date_within_report() {
        let directory = Directory::new();
        let report = ServingInfo::new()
            .with_partition("ds", 1, 0, meta(None, Some("m"), 100))
            .with_partition("ds", 1, 1, meta(Some("m"), None, 200));

        let err = directory
            .reconcile(&node("n1"), &report, NodeEvent::Join)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InconsistentDeployDate {
                expected: 100,
                actual: 200,
                ..
            }
        ));
        assert!(directory.is_empty());
    }

    #[test]
    fn test_deploy_date_must_match_existing_version() {
        let directory = Directory::new();
        directory
            .reconcile(&node("n1"), &three_shards("ts", 1, 100), NodeEvent::Join)
            .unwrap();

        let err = directory
            .reconcile(&node("n2"), &three_shards("ts", 1, 999), NodeEvent::Join)
            .unwrap_err();
        assert!(matches!(err, Error::InconsistentDeployDate { .. }));
    }

    #[test]
    fn test_failed_reconcile_keeps_implicit_leaves_unapplied() {
        let directory = Directory::new();
        directory
            .reconcile(&node("n1"), &three_shards("old", 1, 100), NodeEvent::Join)
            .unwrap();
        directory
            .reconcile(&node("n2"), &three_shards("new", 1, 100), NodeEvent::Join)
            .unwrap();
        let before = directory.snapshot();

        // n1 drops "old" but reports "new" with conflicting bounds
        let conflicting =
            ServingInfo::new().with_partition("new", 1, 0, meta(None, Some("99"), 100));
        assert!(
            directory
                .reconcile(&node("n1"), &conflicting, NodeEvent::Update)
                .is_err()
        );
        assert_eq!(directory.snapshot(), before);
    }

    #[test]
    fn test_explicit_leave_removes_node() {
        let directory = Directory::new();
        let report = three_shards("ts", 1, 100);
        directory.reconcile(&node("n1"), &report, NodeEvent::Join).unwrap();
        directory.reconcile(&node("n2"), &report, NodeEvent::Join).unwrap();

        directory.reconcile(&node("n1"), &report, NodeEvent::Leave).unwrap();
        let tablespace = directory.get(&TablespaceVersion::new("ts", 1)).unwrap();
        assert!(!tablespace.replication_map().contains_node(&node("n1")));
        assert_eq!(tablespace.partition_map().len(), 3);

        let outcome = directory.reconcile(&node("n2"), &report, NodeEvent::Leave).unwrap();
        assert_eq!(outcome.removed, vec![TablespaceVersion::new("ts", 1)]);
        assert!(directory.is_empty());
    }

    #[test]
    fn test_leave_of_unknown_version_publishes_nothing() {
        let directory = Directory::new();
        let outcome = directory
            .reconcile(&node("n1"), &three_shards("ts", 1, 100), NodeEvent::Leave)
            .unwrap();
        assert!(outcome.is_unchanged());
        assert!(directory.is_empty());
    }

    #[test]
    fn test_orphaned_replication_entry_is_rejected() {
        let directory = Directory::new();
        let key = TablespaceVersion::new("ts", 1);
        let broken = Tablespace::new(
            PartitionMap::default(),
            ReplicationMap::from_entries(vec![ReplicationEntry::new(0, node("n1"))]),
            1,
            100,
        );
        directory.insert_snapshot(key.clone(), broken);

        let report = ServingInfo::new().with_partition("ts", 1, 0, meta(None, None, 100));
        let err = directory
            .reconcile(&node("n1"), &report, NodeEvent::Leave)
            .unwrap_err();

        assert!(matches!(err, Error::OrphanedReplicationEntry { shard: 0, .. }));
        assert!(directory.get(&key).is_some());
    }

    #[test]
    fn test_nodes_lists_all_replicas() {
        let directory = Directory::new();
        directory
            .reconcile(&node("n1"), &three_shards("a", 1, 100), NodeEvent::Join)
            .unwrap();
        directory
            .reconcile(&node("n2"), &three_shards("b", 1, 100), NodeEvent::Join)
            .unwrap();

        let nodes: Vec<NodeAddress> = directory.nodes().into_iter().collect();
        assert_eq!(nodes, vec![node("n1"), node("n2")]);
    }

    #[test]
    fn test_replace_served_versions() {
        let directory = Directory::new();
        directory.set_served_version("gone", 1);
        directory.set_served_version("ts", 1);

        let served = HashMap::from([("ts".to_string(), 2), ("new".to_string(), 5)]);
        directory.replace_served_versions(&served);

        assert_eq!(directory.served_version("gone"), None);
        assert_eq!(directory.served_version("ts"), Some(2));
        assert_eq!(directory.served_version("new"), Some(5));
    }
}
