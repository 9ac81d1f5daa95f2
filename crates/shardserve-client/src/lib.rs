//! ShardServe Client - DNode RPC and cluster coordination
//!
//! This crate provides the two collaborators the query node depends on:
//! a client for DNode query/delete calls and the coordination service that
//! tracks live nodes, served versions and membership events.

pub mod coordination;
pub mod node;

// Re-exports
pub use coordination::{CoordinationService, LocalCoordination, MembershipEvent};
pub use node::{HttpNodeClient, NodeClient, NodeError, QueryRequest};
