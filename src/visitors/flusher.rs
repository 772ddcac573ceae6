//! Single writer for the stats file
//!
//! Snapshots are sent to a channel and written by one background task, so two
//! flushes can never interleave on disk. When several snapshots queue up while
//! a write is in progress only the newest one is written.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::store::{StatsDocument, StatsFile};

/// Outcome reported back to a caller that waits for its flush
pub type FlushAck = oneshot::Sender<Result<(), String>>;

pub struct FlushRequest {
    pub document: StatsDocument,
    pub ack: Option<FlushAck>,
}

/// Sender handle for queueing snapshots
pub type FlushSender = mpsc::UnboundedSender<FlushRequest>;

/// Start the flusher background task
/// Returns a sender the counter uses to queue snapshots
pub fn start_flusher(file: Arc<StatsFile>) -> FlushSender {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(flusher_task(file, rx));

    tx
}

async fn flusher_task(file: Arc<StatsFile>, mut rx: mpsc::UnboundedReceiver<FlushRequest>) {
    info!("Stats flusher started ({})", file.path().display());

    while let Some(first) = rx.recv().await {
        let mut document = first.document;
        let mut acks: Vec<FlushAck> = first.ack.into_iter().collect();

        // Senders queue in lock order, so the last one drained is the newest
        while let Ok(next) = rx.try_recv() {
            document = next.document;
            acks.extend(next.ack);
        }

        let result = file.save(&document).await.map_err(|e| e.to_string());
        match &result {
            Ok(()) => debug!(
                "Flushed visitor stats ({} visits) to {}",
                document.total_visits,
                file.path().display()
            ),
            Err(e) => error!("Failed to save visitor stats: {}", e),
        }

        for ack in acks {
            let _ = ack.send(result.clone());
        }
    }

    info!("Stats flusher shutting down");
}
