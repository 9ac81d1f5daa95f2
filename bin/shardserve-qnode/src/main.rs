//! ShardServe Query Node
//!
//! This binary keeps the cluster directory, routes queries to DNodes and
//! retires superseded tablespace versions.

use anyhow::Result;
use axum::routing::get;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use shardserve_qnode::{QNode, api, settings};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "shardserve-qnode")]
#[command(about = "ShardServe Query Node")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/shardserve/qnode.toml")]
    config: String,

    /// Listen address for the REST API (overrides the config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Versions kept below the served one (overrides the config file)
    #[arg(long)]
    max_versions: Option<usize>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = settings::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.qnode.listen = listen;
    }
    if let Some(max_versions) = args.max_versions {
        config.qnode.max_versions_per_tablespace = max_versions;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ShardServe Query Node");
    info!(
        "Keeping {} versions below the served one, query timeout {:?}",
        config.qnode.max_versions_per_tablespace,
        config.qnode.query_timeout()
    );

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;

    let node = Arc::new(QNode::from_config(&config)?);
    let tasks = node.start().await;

    info!("Metrics endpoint: /metrics");
    let app = api::router(node)
        .route("/metrics", get(move || std::future::ready(prometheus.render())))
        .layer(TraceLayer::new_for_http());

    // Parse listen address
    let addr: SocketAddr = config.qnode.listen.parse().map_err(|e| {
        anyhow::anyhow!("Invalid listen address {}: {}", config.qnode.listen, e)
    })?;

    info!("Starting REST API on {}", addr);
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    for task in tasks {
        task.abort();
    }
    info!("Query Node shut down gracefully");

    Ok(())
}
