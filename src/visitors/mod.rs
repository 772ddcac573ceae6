//! Visitor counter
//!
//! Aggregates page views in memory and persists them to a JSON file every
//! `flush_every` visits, on each cleanup pass and on shutdown.

mod cleanup;
mod flusher;
mod stats;
mod store;

pub use cleanup::start_cleanup_task;
pub use stats::{VisitorInfo, VisitorStats, VisitorSummary};
pub use store::StatsFile;

use chrono::Duration;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info, warn};

use crate::clock::SharedClock;
use crate::config::VisitorsConfig;
use crate::error::{Result, StorageError};
use flusher::{FlushAck, FlushRequest, FlushSender};
use store::StatsDocument;

pub struct VisitorCounter {
    stats: Mutex<VisitorStats>,
    flush_tx: FlushSender,
    clock: SharedClock,
    flush_every: u64,
    retention_days: i64,
}

impl VisitorCounter {
    /// Load the stats file and start its writer.
    ///
    /// A missing file starts from zero and is written straight away. A file that
    /// cannot be parsed is moved aside before starting from zero.
    pub async fn open(file: StatsFile, config: &VisitorsConfig, clock: SharedClock) -> Result<Self> {
        let loaded = match file.load().await {
            Ok(Some(document)) => {
                let stats = document.into_stats();
                info!(
                    "Visitor stats loaded from {} ({} visits, {} days)",
                    file.path().display(),
                    stats.total_visits,
                    stats.daily_stats.len()
                );
                Some(stats)
            }
            Ok(None) => {
                info!("No visitor stats at {}, starting fresh", file.path().display());
                None
            }
            Err(StorageError::Corrupt { path, reason }) => {
                let moved = file.quarantine(clock.now()).await?;
                warn!(
                    "Visitor stats at {} are unreadable ({}), moved to {}",
                    path.display(),
                    reason,
                    moved.display()
                );
                None
            }
            Err(e) => return Err(e),
        };

        let fresh = loaded.is_none();
        let counter = Self {
            stats: Mutex::new(loaded.unwrap_or_default()),
            flush_tx: flusher::start_flusher(Arc::new(file)),
            clock,
            flush_every: config.flush_every,
            retention_days: i64::from(config.retention_days),
        };

        if fresh {
            counter.flush().await?;
        }

        Ok(counter)
    }

    /// Count one page view. Never fails; persistence problems are only logged.
    pub async fn record_visit(&self, visitor: &VisitorInfo, path: &str) {
        let today = self.clock.today();
        let fingerprint = visitor.fingerprint();

        let mut stats = self.stats.lock().await;
        let total = stats.record(fingerprint, path, today);

        if self.flush_every > 0 && total % self.flush_every == 0 {
            self.queue_flush(&stats, None);
        }
    }

    pub async fn get_stats(&self) -> VisitorSummary {
        let today = self.clock.today();
        self.stats.lock().await.summary(today)
    }

    /// Drop daily buckets older than the retention window, then persist.
    /// Returns the number of buckets removed.
    pub async fn clean_old_stats(&self) -> usize {
        let cutoff = self.clock.today() - Duration::days(self.retention_days);

        let (removed, ack) = {
            let mut stats = self.stats.lock().await;
            let removed = stats.prune_before(cutoff);
            let (tx, rx) = oneshot::channel();
            self.queue_flush(&stats, Some(tx));
            (removed, rx)
        };

        if removed > 0 {
            info!("Removed {} daily stats entries older than {}", removed, cutoff);
        }

        match ack.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to save visitor stats after cleanup: {}", e),
            Err(_) => error!("Stats flusher stopped before cleanup was saved"),
        }

        removed
    }

    /// Persist the current state and wait for the write to finish.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        {
            let stats = self.stats.lock().await;
            let document = StatsDocument::capture(&stats, self.clock.now());
            self.flush_tx
                .send(FlushRequest {
                    document,
                    ack: Some(tx),
                })
                .map_err(|_| StorageError::WriterClosed)?;
        }

        rx.await
            .map_err(|_| StorageError::WriterClosed)?
            .map_err(StorageError::FlushFailed)
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> VisitorStats {
        self.stats.lock().await.clone()
    }

    // Called with the stats lock held so snapshots reach the writer in order
    fn queue_flush(&self, stats: &VisitorStats, ack: Option<FlushAck>) {
        let document = StatsDocument::capture(stats, self.clock.now());
        if self.flush_tx.send(FlushRequest { document, ack }).is_err() {
            warn!("Stats flusher is not running, visitor stats not saved");
        }
    }
}
