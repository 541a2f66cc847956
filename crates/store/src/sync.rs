//! Background delivery of install and sync reports to the catalog.
//!
//! Installs enqueue jobs after their registry write and move on; a single
//! worker task delivers them with bounded retry. Delivery outcome never
//! feeds back into the install result.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::catalog::{Catalog, InstalledReport, ModuleSyncState};
use crate::config::SyncConfig;
use crate::error::Result;

const QUEUE_CAPACITY: usize = 64;

/// A report waiting to be delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncJob {
    Installed(InstalledReport),
    Sync(Vec<ModuleSyncState>),
}

impl SyncJob {
    fn label(&self) -> &'static str {
        match self {
            SyncJob::Installed(_) => "installed",
            SyncJob::Sync(_) => "sync-modules",
        }
    }

    async fn deliver(&self, catalog: &dyn Catalog) -> Result<()> {
        match self {
            SyncJob::Installed(report) => catalog.report_installed(report).await,
            SyncJob::Sync(states) => catalog.sync_modules(states).await,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub delivered: usize,
    pub dropped: usize,
}

/// Sending half; cheap to clone.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    tx: mpsc::Sender<SyncJob>,
}

/// Handle to the delivery task.
pub struct SyncWorker {
    handle: JoinHandle<SyncStats>,
}

/// Spawn the delivery worker on the current runtime.
pub fn start(catalog: Arc<dyn Catalog>, config: SyncConfig) -> (SyncQueue, SyncWorker) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let handle = tokio::spawn(run(catalog, config, rx));
    (SyncQueue { tx }, SyncWorker { handle })
}

impl SyncQueue {
    /// Queue a job without waiting. Returns `false` when it was dropped.
    pub fn enqueue(&self, job: SyncJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!(job = job.label(), "Sync queue is full; dropping report");
                false
            }
            Err(TrySendError::Closed(job)) => {
                warn!(job = job.label(), "Sync worker has stopped; dropping report");
                false
            }
        }
    }
}

impl SyncWorker {
    /// Wait for the worker to drain.
    ///
    /// The worker only stops once every [`SyncQueue`] clone is dropped.
    /// Returns `None` if it did not finish within `grace`.
    pub async fn finish(self, grace: Duration) -> Option<SyncStats> {
        match tokio::time::timeout(grace, self.handle).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                error!("Sync worker crashed: {}", e);
                None
            }
            Err(_) => {
                warn!("Sync worker still busy after {:?}; abandoning pending reports", grace);
                None
            }
        }
    }
}

async fn run(
    catalog: Arc<dyn Catalog>,
    config: SyncConfig,
    mut rx: mpsc::Receiver<SyncJob>,
) -> SyncStats {
    let mut stats = SyncStats::default();
    let attempts = config.max_attempts.max(1);

    while let Some(job) = rx.recv().await {
        let mut attempt = 1;
        loop {
            match job.deliver(catalog.as_ref()).await {
                Ok(()) => {
                    debug!(job = job.label(), attempt, "Catalog report delivered");
                    stats.delivered += 1;
                    break;
                }
                Err(e) if attempt < attempts => {
                    warn!(job = job.label(), attempt, "Catalog report failed, retrying: {}", e);
                    tokio::time::sleep(config.backoff() * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(job = job.label(), attempt, "Giving up on catalog report: {}", e);
                    stats.dropped += 1;
                    break;
                }
            }
        }
    }

    stats
}
