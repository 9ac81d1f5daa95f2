//! Query routing
//!
//! Resolves a tablespace and key to a partition of the served version and
//! sends the query to one of its replicas. Replicas are picked round-robin
//! per caller; a failing replica makes the router fail over to the next one
//! until every replica of the current set has been tried once.

use crate::directory::Directory;
use crate::metrics;
use serde::Serialize;
use shardserve_client::{NodeClient, NodeError, QueryRequest};
use shardserve_common::{Error, NodeAddress, Result, Tablespace, TablespaceVersion};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-caller round-robin position, keyed by shard
///
/// Each caller (request handler, worker task) owns one; it is never shared.
#[derive(Debug, Default)]
pub struct RoundRobin {
    last: HashMap<u32, usize>,
}

impl RoundRobin {
    /// Create a fresh rotation, starting at the first replica of every shard
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the rotation for `shard` over a replica set of `len` nodes
    pub fn next_index(&mut self, shard: u32, len: usize) -> usize {
        let next = match self.last.get(&shard) {
            Some(&last) if len > 0 => (last + 1) % len,
            _ => 0,
        };
        self.last.insert(shard, next);
        next
    }
}

/// Rows returned by a successful query
#[derive(Clone, Debug, Serialize)]
pub struct QueryResult {
    pub rows: Vec<serde_json::Value>,
    /// Wall time of the successful attempt
    pub millis: u64,
    pub shard: u32,
    pub node: NodeAddress,
}

/// Result of one shard of a multi-partition query
#[derive(Debug)]
pub struct PartitionOutcome {
    pub shard: u32,
    pub result: Result<QueryResult>,
}

/// Routes queries to replicas of the served tablespace versions
pub struct Router {
    directory: Arc<Directory>,
    client: Arc<dyn NodeClient>,
    query_timeout: Duration,
}

impl Router {
    /// Create a router issuing queries through `client`
    pub fn new(
        directory: Arc<Directory>,
        client: Arc<dyn NodeClient>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            client,
            query_timeout,
        }
    }

    /// Run `sql` on the partition of `tablespace` holding `key`
    ///
    /// `key` is parsed as the key kind of the served version before lookup.
    pub async fn route_by_key(
        &self,
        rr: &mut RoundRobin,
        tablespace: &str,
        key: &str,
        sql: &str,
    ) -> Result<QueryResult> {
        let (_, snapshot) = self.resolve(tablespace)?;
        let partition_map = snapshot.partition_map();
        let parsed = partition_map
            .parse_key(key)
            .ok_or_else(|| Error::InvalidKey {
                tablespace: tablespace.to_string(),
                key: key.to_string(),
                kind: partition_map.key_kind(),
            })?;
        let shard = partition_map
            .find_partition(&parsed)
            .ok_or_else(|| Error::KeyOutOfRange {
                tablespace: tablespace.to_string(),
                key: key.to_string(),
            })?;
        self.route_by_partition(rr, tablespace, sql, shard).await
    }

    /// Run `sql` on one partition of the served version of `tablespace`
    pub async fn route_by_partition(
        &self,
        rr: &mut RoundRobin,
        tablespace: &str,
        sql: &str,
        shard: u32,
    ) -> Result<QueryResult> {
        let started = Instant::now();
        let result = self.query_partition(rr, tablespace, sql, shard).await;
        metrics::record_query(tablespace, result.is_ok(), started.elapsed());
        result
    }

    /// Run `sql` on several partitions, in shard order
    ///
    /// `None` queries every partition of the served version. A failing shard
    /// is reported in its outcome and does not stop the others.
    pub async fn route_multi(
        &self,
        rr: &mut RoundRobin,
        tablespace: &str,
        sql: &str,
        shards: Option<&[u32]>,
    ) -> Result<Vec<PartitionOutcome>> {
        let (_, snapshot) = self.resolve(tablespace)?;
        let shards: Vec<u32> = match shards {
            Some(requested) => {
                let mut shards = requested.to_vec();
                shards.sort_unstable();
                shards.dedup();
                shards
            }
            None => snapshot.partition_map().shards().collect(),
        };

        let mut outcomes = Vec::with_capacity(shards.len());
        for shard in shards {
            let result = self.route_by_partition(rr, tablespace, sql, shard).await;
            outcomes.push(PartitionOutcome { shard, result });
        }
        Ok(outcomes)
    }

    /// Served version of `tablespace` and its snapshot
    fn resolve(&self, tablespace: &str) -> Result<(TablespaceVersion, Arc<Tablespace>)> {
        let version = self
            .directory
            .served_version(tablespace)
            .ok_or_else(|| Error::UnknownTablespace(tablespace.to_string()))?;
        let key = TablespaceVersion::new(tablespace, version);
        let snapshot = self
            .directory
            .get(&key)
            .ok_or_else(|| Error::UnknownVersion(key.clone()))?;
        Ok((key, snapshot))
    }

    /// Current replica set of `shard` in the published snapshot of `key`
    fn replicas(&self, key: &TablespaceVersion, shard: u32) -> Result<Vec<NodeAddress>> {
        let snapshot = self
            .directory
            .get(key)
            .ok_or_else(|| Error::UnknownVersion(key.clone()))?;
        let entry = snapshot
            .replication_map()
            .get(shard)
            .ok_or_else(|| Error::IncompleteTablespace {
                key: key.clone(),
                shard,
            })?;
        if entry.is_empty() {
            return Err(Error::NoLiveReplicas {
                key: key.clone(),
                shard,
            });
        }
        Ok(entry.nodes().to_vec())
    }

    async fn query_partition(
        &self,
        rr: &mut RoundRobin,
        tablespace: &str,
        sql: &str,
        shard: u32,
    ) -> Result<QueryResult> {
        let (key, _) = self.resolve(tablespace)?;
        let mut replicas = self.replicas(&key, shard)?;
        let request = QueryRequest::new(tablespace, key.version, shard, sql, self.query_timeout);
        let mut attempts = 0;

        loop {
            let node = replicas[rr.next_index(shard, replicas.len())].clone();
            attempts += 1;
            debug!(
                "Querying {} shard {} on {} (attempt {})",
                key, shard, node, attempts
            );

            let started = Instant::now();
            let result =
                tokio::time::timeout(self.query_timeout, self.client.query(&node, &request)).await;
            let failure = match result {
                Ok(Ok(body)) => {
                    let rows = serde_json::from_str(&body).map_err(|e| {
                        Error::Deserialization(format!("result rows from {node}: {e}"))
                    })?;
                    return Ok(QueryResult {
                        rows,
                        millis: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        shard,
                        node,
                    });
                }
                Ok(Err(e)) => e,
                Err(_) => NodeError::Timeout,
            };
            warn!(
                "Query on {} shard {} failed at {}: {}",
                key, shard, node, failure
            );

            // The replica set may have changed while the query was running
            let current = self.replicas(&key, shard).unwrap_or_default();
            if attempts >= current.len() {
                return Err(Error::NodeFailure {
                    node: node.to_string(),
                    message: failure.to_string(),
                });
            }
            metrics::record_failover(tablespace);
            replicas = current;
        }
    }
}
