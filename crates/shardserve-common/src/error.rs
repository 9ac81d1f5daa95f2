//! Error types for ShardServe
//!
//! This module defines the common error types used throughout the system.

use crate::types::{KeyKind, TablespaceVersion};
use thiserror::Error;

/// Common result type for ShardServe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for ShardServe
#[derive(Debug, Error)]
pub enum Error {
    // Reconciliation errors
    #[error("inconsistent partition metadata between nodes for {key}: {existing} versus {reported}")]
    InconsistentPartition {
        key: TablespaceVersion,
        existing: String,
        reported: String,
    },

    #[error("inconsistent deploy date for {key} shard {shard}: expected {expected}, got {actual}")]
    InconsistentDeployDate {
        key: TablespaceVersion,
        shard: u32,
        expected: i64,
        actual: i64,
    },

    #[error("replication entry for {key} shard {shard} has no partition entry")]
    OrphanedReplicationEntry { key: TablespaceVersion, shard: u32 },

    #[error("partition bound {bound} of {key} shard {shard} is not a valid {kind} key")]
    InvalidPartitionBound {
        key: TablespaceVersion,
        shard: u32,
        bound: String,
        kind: KeyKind,
    },

    // Routing errors
    #[error("unknown tablespace or no version ready to be served: {0}")]
    UnknownTablespace(String),

    #[error("unknown tablespace version: {0}")]
    UnknownVersion(TablespaceVersion),

    #[error("key {key} is not a valid {kind} key for tablespace {tablespace}")]
    InvalidKey {
        tablespace: String,
        key: String,
        kind: KeyKind,
    },

    #[error("key out of partition ranges: {key} for tablespace {tablespace}")]
    KeyOutOfRange { tablespace: String, key: String },

    #[error("incomplete tablespace information for {key} shard {shard}, cluster still converging")]
    IncompleteTablespace { key: TablespaceVersion, shard: u32 },

    #[error("no live replicas for {key} shard {shard}")]
    NoLiveReplicas { key: TablespaceVersion, shard: u32 },

    #[error("query failed on node {node}: {message}")]
    NodeFailure { node: String, message: String },

    // Internal errors
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl Error {
    /// Check if this is a reconciliation consistency error
    #[must_use]
    pub const fn is_inconsistency(&self) -> bool {
        matches!(
            self,
            Self::InconsistentPartition { .. }
                | Self::InconsistentDeployDate { .. }
                | Self::OrphanedReplicationEntry { .. }
                | Self::InvalidPartitionBound { .. }
        )
    }

    /// Check if the caller may succeed by retrying later
    ///
    /// True for cluster states that converge on their own and for replica
    /// failures; false for bad input and unknown tablespaces.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IncompleteTablespace { .. }
                | Self::NoLiveReplicas { .. }
                | Self::NodeFailure { .. }
                | Self::UnknownVersion(_)
        )
    }

    /// Get HTTP status code for the QNode REST API
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidKey { .. } | Self::KeyOutOfRange { .. } => 400,

            // 404 Not Found
            Self::UnknownTablespace(_) | Self::UnknownVersion(_) => 404,

            // 409 Conflict
            Self::InconsistentPartition { .. }
            | Self::InconsistentDeployDate { .. }
            | Self::InvalidPartitionBound { .. } => 409,

            // 500 Internal Server Error
            Self::OrphanedReplicationEntry { .. } | Self::Deserialization(_) => 500,

            // 502 Bad Gateway
            Self::NodeFailure { .. } => 502,

            // 503 Service Unavailable
            Self::IncompleteTablespace { .. } | Self::NoLiveReplicas { .. } => 503,
        }
    }
}
