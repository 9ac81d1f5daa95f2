//! Configuration loading
//!
//! Settings come from an optional TOML file, overlaid with `SHARDSERVE_*`
//! environment variables (`SHARDSERVE_QNODE__LISTEN=0.0.0.0:8080`).

use anyhow::{Context, Result};
use shardserve_common::Config;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "SHARDSERVE";

/// Load configuration from `path` and the environment
///
/// A missing file is not an error; every setting has a default.
pub fn load(path: &str) -> Result<Config> {
    config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .and_then(|c| c.try_deserialize::<Config>())
        .with_context(|| format!("Invalid configuration in {path}"))
}
