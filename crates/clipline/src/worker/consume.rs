use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::executor::{Disposition, Executor};
use crate::config::Config;
use crate::queue::{Consumer, QueueConnector, QueueHandle};

/// Consumer identity and timing, taken from the `queue` and `worker`
/// config sections.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub consumer_name: String,
    pub visibility_timeout: Duration,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            consumer_name: config.worker.consumer_name.clone(),
            visibility_timeout: config.queue.visibility_timeout(),
            poll_interval: config.queue.poll_interval(),
            reconnect_delay: config.queue.reconnect_delay(),
        }
    }
}

/// Counters reported when the worker stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub requeued: u64,
    pub reconnects: u64,
}

impl WorkerStats {
    fn record(&mut self, disposition: &Disposition) {
        match disposition {
            Disposition::Completed { .. } => self.completed += 1,
            Disposition::Failed { .. } => self.failed += 1,
            Disposition::Skipped(_) | Disposition::AlreadyTerminal { .. } => self.skipped += 1,
            Disposition::Requeued => self.requeued += 1,
        }
    }

    pub fn processed(&self) -> u64 {
        self.completed + self.failed + self.skipped
    }
}

/// Long-running consume loop: one delivery at a time, reconnecting to the
/// queue whenever it goes away.
pub struct Worker {
    settings: WorkerSettings,
    connector: Arc<dyn QueueConnector>,
    handle: QueueHandle,
    executor: Executor,
}

impl Worker {
    pub fn new(
        settings: WorkerSettings,
        connector: Arc<dyn QueueConnector>,
        executor: Executor,
    ) -> Self {
        Self {
            settings,
            connector,
            handle: QueueHandle::new(),
            executor,
        }
    }

    /// The handle this worker binds its connection to. Share it with a
    /// [`Submitter`](crate::submit::Submitter) running in the same process.
    pub fn queue_handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// Runs until `cancel` fires. Cancellation is observed between
    /// deliveries; a delivery already being processed runs to its
    /// acknowledgment first.
    pub async fn run(&self, cancel: &CancellationToken) -> WorkerStats {
        let tag = self.settings.consumer_name.as_str();
        let delay = self.settings.reconnect_delay;
        let mut stats = WorkerStats::default();

        info!(consumer = tag, "Worker starting");

        'connection: loop {
            let Some(queue) = self
                .handle
                .reconnect(self.connector.as_ref(), delay, cancel)
                .await
            else {
                break;
            };

            // Anything still leased to this tag belongs to a previous run
            // that died before acknowledging.
            match queue.recover(tag).await {
                Ok(0) => {}
                Ok(n) => info!(consumer = tag, count = n, "Recovered unacknowledged messages"),
                Err(e) => {
                    warn!(consumer = tag, error = %e, "Failed to recover leased messages");
                    if !self.pause(cancel).await {
                        break;
                    }
                    stats.reconnects += 1;
                    continue;
                }
            }

            let mut consumer = Consumer::new(
                queue,
                tag,
                self.settings.visibility_timeout,
                self.settings.poll_interval,
            );
            info!(consumer = tag, "Consuming");

            loop {
                let delivery = match consumer.next(cancel).await {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => break 'connection,
                    Err(e) => {
                        warn!(consumer = tag, error = %e, "Queue connection lost");
                        break;
                    }
                };

                match self.executor.execute(delivery, cancel).await {
                    Ok(disposition) => stats.record(&disposition),
                    Err(e) => {
                        warn!(consumer = tag, error = %e, "Queue connection lost");
                        break;
                    }
                }
            }

            self.handle.invalidate();
            stats.reconnects += 1;
            if !self.pause(cancel).await {
                break;
            }
        }

        self.handle.invalidate();
        info!(
            consumer = tag,
            completed = stats.completed,
            failed = stats.failed,
            skipped = stats.skipped,
            requeued = stats.requeued,
            reconnects = stats.reconnects,
            "Worker stopped"
        );
        stats
    }

    /// Sleeps one reconnect delay. `false` if cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.settings.reconnect_delay) => true,
        }
    }
}
