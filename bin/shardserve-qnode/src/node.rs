//! Query node assembly
//!
//! Builds the directory, router and reaper around one coordination service
//! and starts the background tasks that keep them current.

use parking_lot::Mutex;
use shardserve_client::{CoordinationService, HttpNodeClient, LocalCoordination, NodeClient};
use shardserve_common::Config;
use shardserve_common::config::QNodeConfig;
use shardserve_directory::{Directory, MembershipWatcher, RoundRobin, Router, VersionReaper};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Idle round-robin states for request handlers
///
/// A handler checks one out for the duration of a request, so no two
/// requests ever share a rotation, and the rotation carries over to later
/// requests instead of restarting at the first replica each time.
#[derive(Default)]
pub struct RoundRobinPool {
    idle: Mutex<Vec<RoundRobin>>,
}

impl RoundRobinPool {
    /// Create an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an idle rotation, or a fresh one if none is idle
    pub fn checkout(&self) -> PooledRoundRobin<'_> {
        let rr = self.idle.lock().pop().unwrap_or_default();
        PooledRoundRobin { pool: self, rr }
    }

    /// Number of idle rotations
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

/// Round-robin state checked out of a [`RoundRobinPool`]; returned on drop
pub struct PooledRoundRobin<'a> {
    pool: &'a RoundRobinPool,
    rr: RoundRobin,
}

impl Deref for PooledRoundRobin<'_> {
    type Target = RoundRobin;

    fn deref(&self) -> &RoundRobin {
        &self.rr
    }
}

impl DerefMut for PooledRoundRobin<'_> {
    fn deref_mut(&mut self) -> &mut RoundRobin {
        &mut self.rr
    }
}

impl Drop for PooledRoundRobin<'_> {
    fn drop(&mut self) {
        self.pool.idle.lock().push(std::mem::take(&mut self.rr));
    }
}

/// A running query node
pub struct QNode {
    pub directory: Arc<Directory>,
    pub coordination: Arc<LocalCoordination>,
    pub router: Router,
    pub reaper: Arc<VersionReaper>,
    pub round_robins: RoundRobinPool,
    settings: QNodeConfig,
}

impl QNode {
    /// Assemble a query node talking to DNodes through `client`
    pub fn new(settings: QNodeConfig, client: Arc<dyn NodeClient>, delete_timeout: Duration) -> Self {
        let directory = Arc::new(Directory::new());
        let coordination = Arc::new(LocalCoordination::new(settings.event_buffer));
        let router = Router::new(directory.clone(), client.clone(), settings.query_timeout());
        let reaper = Arc::new(VersionReaper::new(
            directory.clone(),
            coordination.clone(),
            client,
            settings.max_versions_per_tablespace,
            delete_timeout,
        ));
        Self {
            directory,
            coordination,
            router,
            reaper,
            round_robins: RoundRobinPool::new(),
            settings,
        }
    }

    /// Assemble a query node using the HTTP DNode client
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = HttpNodeClient::new(&config.client)?;
        Ok(Self::new(
            config.qnode.clone(),
            Arc::new(client),
            config.client.delete_timeout(),
        ))
    }

    /// Sync with the coordination service and start the background tasks
    ///
    /// The membership watcher always runs; the periodic sweeper runs when a
    /// reap interval is configured, with its first sweep at startup.
    pub async fn start(&self) -> Vec<JoinHandle<()>> {
        let events = self.coordination.subscribe();
        let mut watcher = MembershipWatcher::new(self.directory.clone(), self.coordination.clone());
        if self.settings.reap_on_deploy {
            watcher = watcher.with_reaper(self.reaper.clone());
        }
        watcher.resync().await;

        let mut tasks = vec![tokio::spawn(watcher.run(events))];

        if let Some(interval) = self.settings.reap_interval() {
            info!("Sweeping old versions every {:?}", interval);
            let reaper = self.reaper.clone();
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    reaper.sweep().await;
                }
            }));
        }

        tasks
    }
}
