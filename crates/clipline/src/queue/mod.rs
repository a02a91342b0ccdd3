//! Durable queue between the submission path and the worker.
//!
//! Delivery is at-least-once: a message stays in the queue until the
//! consumer holding its lease acknowledges it. A lease that expires, or a
//! consumer that reconnects and calls [`JobQueue::recover`], makes the
//! message deliverable again.

pub mod consumer;
pub mod handle;
pub mod sqlite;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::job::QueueMessage;

pub use consumer::{Consumer, Delivery};
pub use handle::{QueueConnector, QueueHandle};
pub use sqlite::{SqliteConnector, SqliteQueue};

/// Default queue name shared by producers and consumers.
pub const DEFAULT_QUEUE_NAME: &str = "video_processing_queue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message as handed out by [`JobQueue::claim`], before decoding.
#[derive(Debug, Clone)]
pub struct RawDelivery {
    pub id: MessageId,
    pub body: String,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_count: u32,
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue is not connected")]
    Unavailable,

    #[error("queue storage error: {0}")]
    Database(#[from] DatabaseError),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("lease on message {0} is no longer held by this consumer")]
    LeaseLost(MessageId),
}

/// Port for a durable, named, at-least-once queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    fn name(&self) -> &str;

    /// Durably appends a message.
    async fn publish(&self, message: &QueueMessage) -> Result<MessageId, QueueError>;

    /// Leases the oldest deliverable message to `consumer_tag` for `lease`.
    async fn claim(
        &self,
        consumer_tag: &str,
        lease: Duration,
    ) -> Result<Option<RawDelivery>, QueueError>;

    /// Removes a message. Fails with [`QueueError::LeaseLost`] if another
    /// consumer has taken it over.
    async fn ack(&self, id: MessageId, consumer_tag: &str) -> Result<(), QueueError>;

    /// Returns a leased message to the queue for redelivery.
    async fn release(&self, id: MessageId, consumer_tag: &str) -> Result<(), QueueError>;

    /// Releases every message still leased to `consumer_tag`.
    async fn recover(&self, consumer_tag: &str) -> Result<usize, QueueError>;

    /// Number of messages not yet acknowledged.
    async fn depth(&self) -> Result<u64, QueueError>;
}
