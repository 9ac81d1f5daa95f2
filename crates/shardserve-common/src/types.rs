//! Core type definitions for ShardServe
//!
//! This module defines the cluster directory data model: node addresses,
//! tablespace versions, partition and replication maps, and the per-node
//! serving report that DNodes publish.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Network address of a DNode (e.g. `10.0.0.4:4422` or `http://dnode-1:4422`)
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From)]
#[display("{_0}")]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Create a new node address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get the address as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeAddress {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddress({:?})", self.0)
    }
}

/// Key of the directory: one version of one tablespace
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{tablespace}@v{version}")]
pub struct TablespaceVersion {
    /// Tablespace (dataset) name
    pub tablespace: String,
    /// Version number
    pub version: i64,
}

impl TablespaceVersion {
    /// Create a new tablespace version key
    pub fn new(tablespace: impl Into<String>, version: i64) -> Self {
        Self {
            tablespace: tablespace.into(),
            version,
        }
    }
}

/// Kind of membership change that triggered a reconciliation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeEvent {
    /// A node joined the cluster
    Join,
    /// A node left the cluster
    Leave,
    /// A node republished its serving info
    Update,
}

impl NodeEvent {
    /// Upper-case name used in logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "JOIN",
            Self::Leave => "LEAVE",
            Self::Update => "UPDATE",
        }
    }
}

impl fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of the partitioning key of a tablespace version
///
/// Bounds travel as strings; the kind says how to parse and order them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// Signed integer keys (32 or 64 bit)
    Int,
    /// Floating point keys
    Float,
    /// String keys, ordered lexicographically
    #[default]
    Text,
}

impl KeyKind {
    /// Parse a raw key or bound as this kind
    ///
    /// Returns `None` for text that is not a valid key of this kind. NaN is
    /// not a valid float key.
    #[must_use]
    pub fn parse(self, raw: &str) -> Option<PartitionKey> {
        match self {
            Self::Int => raw.parse().ok().map(PartitionKey::Int),
            Self::Float => raw
                .parse::<f64>()
                .ok()
                .filter(|v| !v.is_nan())
                .map(PartitionKey::Float),
            Self::Text => Some(PartitionKey::Text(raw.to_string())),
        }
    }

    fn parse_bound(self, bound: Option<&str>) -> std::result::Result<Option<PartitionKey>, &str> {
        match bound {
            Some(raw) => self.parse(raw).map(Some).ok_or(raw),
            None => Ok(None),
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
        })
    }
}

/// A parsed partitioning key
///
/// Keys of the same kind compare by value. Keys of different kinds never
/// meet within one tablespace version; they order by kind.
#[derive(Clone, Debug)]
pub enum PartitionKey {
    Int(i64),
    Float(f64),
    Text(String),
}

impl PartitionKey {
    const fn rank(&self) -> u8 {
        match self {
            Self::Int(_) => 0,
            Self::Float(_) => 1,
            Self::Text(_) => 2,
        }
    }
}

impl Ord for PartitionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for PartitionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PartitionKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PartitionKey {}

impl From<i64> for PartitionKey {
    fn from(key: i64) -> Self {
        Self::Int(key)
    }
}

impl From<f64> for PartitionKey {
    fn from(key: f64) -> Self {
        Self::Float(key)
    }
}

impl From<&str> for PartitionKey {
    fn from(key: &str) -> Self {
        Self::Text(key.to_string())
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(key) => write!(f, "{key}"),
            Self::Float(key) => write!(f, "{key}"),
            Self::Text(key) => f.write_str(key),
        }
    }
}

/// Key range owned by one shard of a tablespace version
///
/// Ranges are half-open: `min` is inclusive, `max` exclusive. A missing
/// `min` extends to minus infinity and a missing `max` to plus infinity.
/// An entry with neither bound is a wildcard.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionEntry {
    /// Shard index within the tablespace version
    pub shard: u32,
    /// Inclusive lower bound
    pub min: Option<String>,
    /// Exclusive upper bound
    pub max: Option<String>,
    /// How the bounds are parsed and ordered
    #[serde(default)]
    pub key_kind: KeyKind,
}

impl PartitionEntry {
    /// Create a new partition entry with text bounds
    #[must_use]
    pub const fn new(shard: u32, min: Option<String>, max: Option<String>) -> Self {
        Self {
            shard,
            min,
            max,
            key_kind: KeyKind::Text,
        }
    }

    /// Set the key kind the bounds are parsed as
    #[must_use]
    pub fn with_key_kind(mut self, key_kind: KeyKind) -> Self {
        self.key_kind = key_kind;
        self
    }

    /// Whether neither bound is set
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Bounds parsed as the entry's key kind
    ///
    /// Fails with the first bound that is not a valid key of that kind.
    pub fn key_range(&self) -> std::result::Result<KeyRange, &str> {
        Ok(KeyRange {
            shard: self.shard,
            min: self.key_kind.parse_bound(self.min.as_deref())?,
            max: self.key_kind.parse_bound(self.max.as_deref())?,
        })
    }

    /// Whether both bounds and the key kind match `other` exactly
    /// (absent only matches absent)
    #[must_use]
    pub fn same_bounds(&self, other: &Self) -> bool {
        self.min == other.min && self.max == other.max && self.key_kind == other.key_kind
    }
}

/// Parsed bounds of one shard
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRange {
    pub shard: u32,
    pub min: Option<PartitionKey>,
    pub max: Option<PartitionKey>,
}

impl KeyRange {
    /// Whether `key` falls inside `[min, max)`
    #[must_use]
    pub fn contains(&self, key: &PartitionKey) -> bool {
        self.min.as_ref().is_none_or(|min| key >= min)
            && self.max.as_ref().is_none_or(|max| key < max)
    }
}

impl fmt::Display for PartitionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shard {} [{}, {}) {}",
            self.shard,
            self.min.as_deref().unwrap_or("-inf"),
            self.max.as_deref().unwrap_or("+inf"),
            self.key_kind
        )
    }
}

/// Partition boundaries of one tablespace version, keyed by shard
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PartitionEntry>", into = "Vec<PartitionEntry>")]
pub struct PartitionMap {
    entries: BTreeMap<u32, PartitionEntry>,
    key_kind: KeyKind,
    /// Parsed bounded entries ordered by lower bound
    ranges: Vec<KeyRange>,
    /// Lowest wildcard shard, the catch-all for unmatched keys
    wildcard: Option<u32>,
}

impl PartitionMap {
    /// Build a partition map; a later entry for the same shard replaces an earlier one
    pub fn from_entries(entries: impl IntoIterator<Item = PartitionEntry>) -> Self {
        let entries: BTreeMap<u32, PartitionEntry> =
            entries.into_iter().map(|e| (e.shard, e)).collect();

        let key_kind = entries.values().next().map(|e| e.key_kind).unwrap_or_default();

        // Unparseable bounds never match; reconciliation rejects them anyway
        let mut ranges: Vec<KeyRange> = entries
            .values()
            .filter(|e| !e.is_wildcard())
            .filter_map(|e| e.key_range().ok())
            .collect();
        ranges.sort_by(|a, b| a.min.cmp(&b.min).then(a.shard.cmp(&b.shard)));

        let wildcard = entries.values().find(|e| e.is_wildcard()).map(|e| e.shard);

        Self {
            entries,
            key_kind,
            ranges,
            wildcard,
        }
    }

    /// Kind of the partitioning key
    #[must_use]
    pub const fn key_kind(&self) -> KeyKind {
        self.key_kind
    }

    /// Parse a raw query key as this map's key kind
    #[must_use]
    pub fn parse_key(&self, raw: &str) -> Option<PartitionKey> {
        self.key_kind.parse(raw)
    }

    /// Find the shard whose range contains `key`
    ///
    /// Returns `None` when the key falls in a gap and no wildcard shard exists.
    #[must_use]
    pub fn find_partition(&self, key: &PartitionKey) -> Option<u32> {
        let upper = self
            .ranges
            .partition_point(|r| r.min.as_ref().is_none_or(|min| min <= key));
        if upper > 0 {
            let candidate = &self.ranges[upper - 1];
            if candidate.contains(key) {
                return Some(candidate.shard);
            }
        }
        self.wildcard
    }

    /// Get the entry for a shard
    #[must_use]
    pub fn get(&self, shard: u32) -> Option<&PartitionEntry> {
        self.entries.get(&shard)
    }

    /// Entries in shard order
    pub fn entries(&self) -> impl Iterator<Item = &PartitionEntry> {
        self.entries.values()
    }

    /// Shard indexes in ascending order
    pub fn shards(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Number of partitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no partitions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<PartitionEntry>> for PartitionMap {
    fn from(entries: Vec<PartitionEntry>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<PartitionMap> for Vec<PartitionEntry> {
    fn from(map: PartitionMap) -> Self {
        map.entries.into_values().collect()
    }
}

/// Nodes currently serving one shard, in the order they joined
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationEntry {
    shard: u32,
    nodes: Vec<NodeAddress>,
}

impl ReplicationEntry {
    /// Create an entry with a single replica
    #[must_use]
    pub fn new(shard: u32, node: NodeAddress) -> Self {
        Self {
            shard,
            nodes: vec![node],
        }
    }

    /// Create an entry from a list of replicas, dropping duplicates
    pub fn with_nodes(shard: u32, nodes: impl IntoIterator<Item = NodeAddress>) -> Self {
        let mut entry = Self {
            shard,
            nodes: Vec::new(),
        };
        for node in nodes {
            entry.add_node(node);
        }
        entry
    }

    /// Shard index
    #[must_use]
    pub const fn shard(&self) -> u32 {
        self.shard
    }

    /// Replicas in join order
    #[must_use]
    pub fn nodes(&self) -> &[NodeAddress] {
        &self.nodes
    }

    /// Whether `node` is a replica
    #[must_use]
    pub fn contains(&self, node: &NodeAddress) -> bool {
        self.nodes.contains(node)
    }

    /// Add a replica; returns false if it was already present
    pub fn add_node(&mut self, node: NodeAddress) -> bool {
        if self.nodes.contains(&node) {
            return false;
        }
        self.nodes.push(node);
        true
    }

    /// Remove a replica; returns false if it was not present
    pub fn remove_node(&mut self, node: &NodeAddress) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n != node);
        self.nodes.len() != before
    }

    /// Whether no node serves this shard
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Replica sets of one tablespace version, keyed by shard
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ReplicationEntry>", into = "Vec<ReplicationEntry>")]
pub struct ReplicationMap {
    entries: BTreeMap<u32, ReplicationEntry>,
}

impl ReplicationMap {
    /// Build a replication map; a later entry for the same shard replaces an earlier one
    pub fn from_entries(entries: impl IntoIterator<Item = ReplicationEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.shard, e)).collect(),
        }
    }

    /// Get the replica set of a shard
    #[must_use]
    pub fn get(&self, shard: u32) -> Option<&ReplicationEntry> {
        self.entries.get(&shard)
    }

    /// Entries in shard order
    pub fn entries(&self) -> impl Iterator<Item = &ReplicationEntry> {
        self.entries.values()
    }

    /// Shard indexes in ascending order
    pub fn shards(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Number of shards with a replica set
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no shard has a replica set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of replicas over all shards
    #[must_use]
    pub fn total_replicas(&self) -> usize {
        self.entries.values().map(|e| e.nodes.len()).sum()
    }

    /// Whether `node` serves any shard
    #[must_use]
    pub fn contains_node(&self, node: &NodeAddress) -> bool {
        self.entries.values().any(|e| e.contains(node))
    }
}

impl From<Vec<ReplicationEntry>> for ReplicationMap {
    fn from(entries: Vec<ReplicationEntry>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<ReplicationMap> for Vec<ReplicationEntry> {
    fn from(map: ReplicationMap) -> Self {
        map.entries.into_values().collect()
    }
}

/// Immutable snapshot of one tablespace version
///
/// Reconciliation never mutates a published snapshot; it builds a new one
/// and swaps it into the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tablespace {
    partition_map: PartitionMap,
    replication_map: ReplicationMap,
    version: i64,
    creation_date: i64,
}

impl Tablespace {
    /// Create a new snapshot
    #[must_use]
    pub const fn new(
        partition_map: PartitionMap,
        replication_map: ReplicationMap,
        version: i64,
        creation_date: i64,
    ) -> Self {
        Self {
            partition_map,
            replication_map,
            version,
            creation_date,
        }
    }

    /// Partition boundaries
    #[must_use]
    pub const fn partition_map(&self) -> &PartitionMap {
        &self.partition_map
    }

    /// Replica sets
    #[must_use]
    pub const fn replication_map(&self) -> &ReplicationMap {
        &self.replication_map
    }

    /// Version number
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// Deployment timestamp (milliseconds since the Unix epoch)
    #[must_use]
    pub const fn creation_date(&self) -> i64 {
        self.creation_date
    }
}

/// What a DNode reports about one partition it serves
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMetadata {
    /// Inclusive lower key bound
    #[serde(default)]
    pub min_key: Option<String>,
    /// Exclusive upper key bound
    #[serde(default)]
    pub max_key: Option<String>,
    /// Deployment timestamp (milliseconds since the Unix epoch)
    pub deployment_date: i64,
    /// Type of the partitioning key
    #[serde(default)]
    pub key_kind: KeyKind,
}

impl PartitionMetadata {
    /// Create new partition metadata with text bounds
    #[must_use]
    pub const fn new(min_key: Option<String>, max_key: Option<String>, deployment_date: i64) -> Self {
        Self {
            min_key,
            max_key,
            deployment_date,
            key_kind: KeyKind::Text,
        }
    }

    /// Set the key kind the bounds are parsed as
    #[must_use]
    pub fn with_key_kind(mut self, key_kind: KeyKind) -> Self {
        self.key_kind = key_kind;
        self
    }
}

/// Per-node serving report: tablespace -> version -> shard -> metadata
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServingInfo(BTreeMap<String, BTreeMap<i64, BTreeMap<u32, PartitionMetadata>>>);

impl ServingInfo {
    /// Create an empty report
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the node serves a partition
    pub fn insert(
        &mut self,
        tablespace: impl Into<String>,
        version: i64,
        shard: u32,
        metadata: PartitionMetadata,
    ) {
        self.0
            .entry(tablespace.into())
            .or_default()
            .entry(version)
            .or_default()
            .insert(shard, metadata);
    }

    /// Builder form of [`ServingInfo::insert`]
    #[must_use]
    pub fn with_partition(
        mut self,
        tablespace: impl Into<String>,
        version: i64,
        shard: u32,
        metadata: PartitionMetadata,
    ) -> Self {
        self.insert(tablespace, version, shard, metadata);
        self
    }

    /// Whether the report lists `shard` of the given tablespace version
    #[must_use]
    pub fn serves(&self, key: &TablespaceVersion, shard: u32) -> bool {
        self.0
            .get(&key.tablespace)
            .and_then(|versions| versions.get(&key.version))
            .is_some_and(|shards| shards.contains_key(&shard))
    }

    /// Reported versions, in tablespace then version order
    pub fn versions(
        &self,
    ) -> impl Iterator<Item = (TablespaceVersion, &BTreeMap<u32, PartitionMetadata>)> {
        self.0.iter().flat_map(|(tablespace, versions)| {
            versions
                .iter()
                .map(move |(version, shards)| (TablespaceVersion::new(tablespace, *version), shards))
        })
    }

    /// Whether the node serves nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
