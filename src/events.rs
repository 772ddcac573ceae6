//! Event bus for broadcasting archive changes

use crate::archive::Post;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArchiveEvent {
    PostAdded { post: Post },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<ArchiveEvent>>,
}

impl EventBus {
    pub fn new(sender: broadcast::Sender<Arc<ArchiveEvent>>) -> Self {
        Self { sender }
    }

    pub fn publish(&self, event: ArchiveEvent) {
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ArchiveEvent>> {
        self.sender.subscribe()
    }
}
