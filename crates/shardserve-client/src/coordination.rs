//! Cluster coordination service
//!
//! The coordination service owns cluster membership and the map of versions
//! currently served per tablespace. The query node consumes it through
//! [`CoordinationService`]; [`LocalCoordination`] is the in-process
//! implementation used by a standalone query node, where DNodes publish
//! their serving info over the REST API.

use async_trait::async_trait;
use parking_lot::RwLock;
use shardserve_common::{NodeAddress, NodeEvent, ServingInfo};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Notification delivered to membership subscribers
#[derive(Clone, Debug)]
pub enum MembershipEvent {
    /// A node joined, left, or republished what it serves
    Node {
        node: NodeAddress,
        serving_info: ServingInfo,
        event: NodeEvent,
    },
    /// The served-versions map changed (a deployment was switched live)
    ServedVersionsChanged,
}

/// Shared cluster state consumed by the query node
#[async_trait]
pub trait CoordinationService: Send + Sync {
    /// Version currently served for `tablespace`
    async fn current_served_version(&self, tablespace: &str) -> Option<i64>;

    /// Copy of the served-versions map; `None` until any version is served
    async fn all_served_versions(&self) -> Option<HashMap<String, i64>>;

    /// Addresses of all live nodes
    async fn live_nodes(&self) -> Vec<NodeAddress>;

    /// Latest serving info of every live node
    async fn node_reports(&self) -> Vec<(NodeAddress, ServingInfo)>;

    /// Subscribe to membership events, delivered in publication order
    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent>;
}

/// In-process coordination service
pub struct LocalCoordination {
    /// Live nodes and their latest serving info
    nodes: RwLock<BTreeMap<NodeAddress, ServingInfo>>,
    /// Served version per tablespace
    served: RwLock<Option<HashMap<String, i64>>>,
    events: broadcast::Sender<MembershipEvent>,
}

impl LocalCoordination {
    /// Create a coordination service buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            served: RwLock::new(None),
            events,
        }
    }

    /// Record the serving info of `node`, returning JOIN for a new node and UPDATE otherwise
    pub fn publish(&self, node: NodeAddress, serving_info: ServingInfo) -> NodeEvent {
        // Emit under the lock so subscribers see events in state order
        let mut nodes = self.nodes.write();
        let event = if nodes.insert(node.clone(), serving_info.clone()).is_some() {
            NodeEvent::Update
        } else {
            info!("Node {} joined", node);
            NodeEvent::Join
        };
        self.emit(MembershipEvent::Node {
            node,
            serving_info,
            event,
        });
        event
    }

    /// Remove `node` from the cluster; returns false if it was not live
    pub fn leave(&self, node: &NodeAddress) -> bool {
        let mut nodes = self.nodes.write();
        let Some(serving_info) = nodes.remove(node) else {
            return false;
        };
        info!("Node {} left", node);
        self.emit(MembershipEvent::Node {
            node: node.clone(),
            serving_info,
            event: NodeEvent::Leave,
        });
        true
    }

    /// Switch the served version of `tablespace`
    pub fn set_served_version(&self, tablespace: impl Into<String>, version: i64) {
        let tablespace = tablespace.into();
        let mut served = self.served.write();
        info!("Serving {} at version {}", tablespace, version);
        served
            .get_or_insert_with(HashMap::new)
            .insert(tablespace, version);
        self.emit(MembershipEvent::ServedVersionsChanged);
    }

    fn emit(&self, event: MembershipEvent) {
        if self.events.send(event).is_err() {
            debug!("No membership subscribers");
        }
    }
}

impl Default for LocalCoordination {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl CoordinationService for LocalCoordination {
    async fn current_served_version(&self, tablespace: &str) -> Option<i64> {
        self.served
            .read()
            .as_ref()
            .and_then(|served| served.get(tablespace).copied())
    }

    async fn all_served_versions(&self) -> Option<HashMap<String, i64>> {
        self.served.read().clone()
    }

    async fn live_nodes(&self) -> Vec<NodeAddress> {
        self.nodes.read().keys().cloned().collect()
    }

    async fn node_reports(&self) -> Vec<(NodeAddress, ServingInfo)> {
        self.nodes
            .read()
            .iter()
            .map(|(node, info)| (node.clone(), info.clone()))
            .collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }
}
