use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{JobQueue, MessageId, QueueError, RawDelivery};

/// A named consumer with a prefetch of one.
///
/// [`Consumer::next`] hands out a [`Delivery`] that mutably borrows the
/// consumer, so the next message cannot be requested until the current
/// one has been acknowledged or requeued.
pub struct Consumer {
    queue: Arc<dyn JobQueue>,
    tag: String,
    lease: Duration,
    poll_interval: Duration,
}

impl Consumer {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        tag: impl Into<String>,
        lease: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            tag: tag.into(),
            lease,
            poll_interval,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Waits for the next message, polling while the queue is empty.
    /// Returns `Ok(None)` once `cancel` fires.
    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Delivery<'_>>, QueueError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let claimed = self.queue.claim(&self.tag, self.lease).await?;
            if let Some(raw) = claimed {
                debug!(
                    consumer = %self.tag,
                    message_id = %raw.id,
                    delivery_count = raw.delivery_count,
                    "Claimed message"
                );
                return Ok(Some(Delivery { consumer: self, raw }));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

/// An outstanding message. Dropping it without [`ack`](Self::ack) or
/// [`requeue`](Self::requeue) leaves it leased until the lease expires or
/// the consumer's tag is recovered.
pub struct Delivery<'a> {
    consumer: &'a mut Consumer,
    raw: RawDelivery,
}

impl Delivery<'_> {
    pub fn id(&self) -> MessageId {
        self.raw.id
    }

    pub fn body(&self) -> &str {
        &self.raw.body
    }

    pub fn delivery_count(&self) -> u32 {
        self.raw.delivery_count
    }

    pub fn is_redelivery(&self) -> bool {
        self.raw.delivery_count > 1
    }

    pub async fn ack(self) -> Result<(), QueueError> {
        self.consumer.queue.ack(self.raw.id, &self.consumer.tag).await
    }

    /// Negative acknowledgment: the message goes back to the queue.
    pub async fn requeue(self) -> Result<(), QueueError> {
        self.consumer
            .queue
            .release(self.raw.id, &self.consumer.tag)
            .await
    }
}
