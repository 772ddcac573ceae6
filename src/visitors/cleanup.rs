//! Periodic retention pass over the daily buckets

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::VisitorCounter;

/// Run [`VisitorCounter::clean_old_stats`] every `period`, first after one full period.
pub fn start_cleanup_task(counter: Arc<VisitorCounter>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Visitor stats cleanup scheduled every {:?}", period);

        loop {
            ticker.tick().await;
            let removed = counter.clean_old_stats().await;
            debug!("Cleanup pass finished ({} buckets removed)", removed);
        }
    })
}
