//! ShardServe Common - Shared types and utilities
//!
//! This crate provides the cluster directory data model, error definitions,
//! and configuration used across all ShardServe components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
