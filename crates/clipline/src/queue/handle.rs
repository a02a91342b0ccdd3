use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{JobQueue, QueueError};
use crate::reconnect;

/// Establishes a fresh queue connection.
#[async_trait]
pub trait QueueConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn JobQueue>, QueueError>;
}

/// Shared, rebindable slot holding the current queue connection.
///
/// Producers call [`QueueHandle::get`] per operation and fail fast with
/// [`QueueError::Unavailable`] while the slot is empty. The owner of the
/// connection calls [`QueueHandle::invalidate`] when it notices the
/// connection is gone and [`QueueHandle::reconnect`] to bind a new one.
/// Every clone sees the rebinding.
#[derive(Clone, Default)]
pub struct QueueHandle {
    slot: Arc<RwLock<Option<Arc<dyn JobQueue>>>>,
}

impl QueueHandle {
    /// An empty handle. [`get`](Self::get) fails until something is bound.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bound(queue: Arc<dyn JobQueue>) -> Self {
        let handle = Self::new();
        handle.bind(queue);
        handle
    }

    pub fn bind(&self, queue: Arc<dyn JobQueue>) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some(queue);
        }
    }

    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = None;
        }
    }

    pub fn is_bound(&self) -> bool {
        self.slot.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// The live connection, or `Unavailable` if none is bound.
    pub fn get(&self) -> Result<Arc<dyn JobQueue>, QueueError> {
        self.slot
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or(QueueError::Unavailable)
    }

    /// Connects with a fixed delay between attempts, forever, and binds the
    /// result. Returns `None` only if `cancel` fires first.
    pub async fn reconnect(
        &self,
        connector: &dyn QueueConnector,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Option<Arc<dyn JobQueue>> {
        self.invalidate();
        let queue = reconnect::retry_forever("queue", delay, cancel, || connector.connect()).await?;
        info!(queue = queue.name(), "Queue connection bound");
        self.bind(queue.clone());
        Some(queue)
    }
}
