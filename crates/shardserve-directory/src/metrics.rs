//! Metric names and recording helpers
//!
//! Recording goes through the `metrics` facade; without an installed
//! recorder every call is a no-op.

use std::time::Duration;

pub const QUERIES_TOTAL: &str = "shardserve_queries_total";
pub const QUERY_FAILOVERS_TOTAL: &str = "shardserve_query_failovers_total";
pub const QUERY_MILLIS: &str = "shardserve_query_millis";
pub const RECONCILE_ERRORS_TOTAL: &str = "shardserve_reconcile_errors_total";
pub const VERSIONS_REAPED_TOTAL: &str = "shardserve_versions_reaped_total";
pub const TABLESPACE_VERSIONS: &str = "shardserve_tablespace_versions";

/// Record the outcome of a routed query
pub fn record_query(tablespace: &str, ok: bool, elapsed: Duration) {
    let status = if ok { "ok" } else { "error" };
    ::metrics::counter!(QUERIES_TOTAL, "tablespace" => tablespace.to_string(), "status" => status)
        .increment(1);
    if ok {
        ::metrics::histogram!(QUERY_MILLIS, "tablespace" => tablespace.to_string())
            .record(elapsed.as_secs_f64() * 1000.0);
    }
}

/// Record a fail-over to the next replica
pub fn record_failover(tablespace: &str) {
    ::metrics::counter!(QUERY_FAILOVERS_TOTAL, "tablespace" => tablespace.to_string()).increment(1);
}

/// Record a rejected reconciliation
pub fn record_reconcile_error() {
    ::metrics::counter!(RECONCILE_ERRORS_TOTAL).increment(1);
}

/// Record versions scheduled for deletion by a sweep
pub fn record_reaped(count: usize) {
    ::metrics::counter!(VERSIONS_REAPED_TOTAL).increment(count as u64);
}

/// Publish the number of tablespace versions in the directory
#[allow(clippy::cast_precision_loss)]
pub fn set_tablespace_versions(count: usize) {
    ::metrics::gauge!(TABLESPACE_VERSIONS).set(count as f64);
}
