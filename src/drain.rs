//! The supervised queue drain: a lockfile-guarded loop that invokes the
//! dispatch engine until no eligible notification remains.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use crate::dispatch::DispatchEngine;
use crate::error::DrainError;
use crate::models::log::LogLevel;
use crate::store::NotificationStore;

/// Exclusive-create lockfile guarding the drain against concurrent
/// instances. Removed when dropped.
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Returns `None` when another holder already owns the lock; that is an
    /// expected condition, not a failure.
    pub fn acquire(path: &Path) -> std::io::Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Some(Self {
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub iterations: u32,
    pub sent: usize,
    pub failed: usize,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.sent + self.failed
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed(DrainReport),
    LockHeld,
}

pub struct Drainer {
    engine: DispatchEngine,
    store: Arc<dyn NotificationStore>,
    lockfile: PathBuf,
    shard_count: usize,
    log_level: LogLevel,
}

impl Drainer {
    pub fn new(
        engine: DispatchEngine,
        lockfile: PathBuf,
        shard_count: usize,
        log_level: LogLevel,
    ) -> Self {
        let store = engine.store().clone();
        Self {
            engine,
            store,
            lockfile,
            shard_count,
            log_level,
        }
    }

    /// Drains the queue to empty under the lock. Every iteration resolves
    /// each selected notification to sent or failed, so the loop terminates
    /// after at most ceil(queue depth / batch size) passes barring
    /// concurrent producers. Engine errors are logged and re-raised; the
    /// loop never spins on a persistent failure.
    pub async fn run(&self) -> Result<DrainOutcome, DrainError> {
        info!(lockfile = %self.lockfile.display(), "acquiring lock for sending queued notifications");

        let Some(_lock) = FileLock::acquire(&self.lockfile)? else {
            info!("failed to acquire lock, terminating now");
            return Ok(DrainOutcome::LockHeld);
        };

        let mut report = DrainReport::default();
        loop {
            let stats = match self.engine.drain_once(self.shard_count, self.log_level).await {
                Ok(stats) => stats,
                Err(e) => {
                    error!(error = %e, "drain iteration failed");
                    return Err(e.into());
                }
            };

            report.iterations += 1;
            report.sent += stats.sent;
            report.failed += stats.failed;

            if !self.store.has_due().await? {
                break;
            }
        }

        info!(
            iterations = report.iterations,
            attempted = report.attempted(),
            sent = report.sent,
            failed = report.failed,
            "queue drained"
        );

        Ok(DrainOutcome::Completed(report))
    }
}
