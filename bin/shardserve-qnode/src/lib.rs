//! ShardServe query node
//!
//! Wires the directory, router and reaper to an in-process coordination
//! service and exposes them over a REST API.

pub mod api;
pub mod node;
pub mod settings;

pub use node::{QNode, RoundRobinPool};
