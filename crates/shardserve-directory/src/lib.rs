//! ShardServe Directory - cluster directory and query routing
//!
//! This crate implements the query node's view of the cluster:
//!
//! - [`Directory`] folds per-node serving reports into one consistent map of
//!   tablespace versions, their partition boundaries and replica sets.
//! - [`VersionReaper`] decides which superseded versions can be deleted and
//!   tells every live node to drop them.
//! - [`Router`] resolves a key to a partition and sends the query to a live
//!   replica, rotating across replicas and failing over on node errors.
//! - [`MembershipWatcher`] feeds coordination events into the directory.
//!
//! # Example
//! ```ignore
//! use shardserve_directory::{Directory, Router, RoundRobin};
//!
//! let directory = Arc::new(Directory::new());
//! directory.reconcile(&node, &serving_info, NodeEvent::Join)?;
//! directory.set_served_version("users", 3);
//!
//! let router = Router::new(directory.clone(), client, timeout);
//! let mut rr = RoundRobin::new();
//! let result = router.route_by_key(&mut rr, "users", "bob", "SELECT 1").await?;
//! ```

pub mod directory;
pub mod metrics;
pub mod reaper;
pub mod router;
pub mod watcher;

pub use directory::{Directory, ReconcileOutcome};
pub use reaper::{DeliveryOutcome, SweepReport, VersionReaper};
pub use router::{PartitionOutcome, QueryResult, RoundRobin, Router};
pub use watcher::MembershipWatcher;
