//! Shared fixtures for the directory integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use shardserve_client::{NodeClient, NodeError, QueryRequest};
use shardserve_common::{NodeAddress, PartitionMetadata, ServingInfo, TablespaceVersion};
use std::collections::HashSet;
use std::time::Duration;

/// In-memory stand-in for a fleet of DNodes
#[derive(Default)]
pub struct FakeNodes {
    down: Mutex<HashSet<NodeAddress>>,
    pub queries: Mutex<Vec<(NodeAddress, QueryRequest)>>,
    pub deletes: Mutex<Vec<(NodeAddress, Vec<TablespaceVersion>)>>,
}

impl FakeNodes {
    /// Make `node` refuse connections
    pub fn take_down(&self, node: &str) {
        self.down.lock().insert(NodeAddress::from(node));
    }

    pub fn bring_up(&self, node: &str) {
        self.down.lock().remove(&NodeAddress::from(node));
    }

    /// Nodes that answered or refused queries, in call order
    pub fn queried_nodes(&self) -> Vec<String> {
        self.queries
            .lock()
            .iter()
            .map(|(node, _)| node.to_string())
            .collect()
    }
}

#[async_trait]
impl NodeClient for FakeNodes {
    async fn query(&self, node: &NodeAddress, request: &QueryRequest) -> Result<String, NodeError> {
        self.queries.lock().push((node.clone(), request.clone()));
        if self.down.lock().contains(node) {
            return Err(NodeError::Transport(format!("{node}: connection refused")));
        }
        Ok(format!(
            r#"[{{"tablespace":"{}","version":{},"shard":{}}}]"#,
            request.tablespace, request.version, request.partition
        ))
    }

    async fn delete_old_versions(
        &self,
        node: &NodeAddress,
        versions: &[TablespaceVersion],
    ) -> Result<(), NodeError> {
        self.deletes.lock().push((node.clone(), versions.to_vec()));
        if self.down.lock().contains(node) {
            return Err(NodeError::Transport(format!("{node}: connection refused")));
        }
        Ok(())
    }
}

/// Bounds of shard `shard` in a tablespace split at "g" and "p"
pub fn bounds(shard: u32) -> (Option<String>, Option<String>) {
    match shard {
        0 => (None, Some("g".to_string())),
        1 => (Some("g".to_string()), Some("p".to_string())),
        _ => (Some("p".to_string()), None),
    }
}

/// Add every listed shard of `tablespace@version` to `info`
pub fn serve(info: &mut ServingInfo, tablespace: &str, version: i64, shards: &[u32]) {
    for &shard in shards {
        let (min, max) = bounds(shard);
        info.insert(
            tablespace,
            version,
            shard,
            PartitionMetadata::new(min, max, version * 1_000),
        );
    }
}

/// Report of a node serving all three shards of `tablespace@version`
pub fn full_report(tablespace: &str, version: i64) -> ServingInfo {
    let mut info = ServingInfo::new();
    serve(&mut info, tablespace, version, &[0, 1, 2]);
    info
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
