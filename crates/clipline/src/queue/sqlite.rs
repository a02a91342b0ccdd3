use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{JobQueue, MessageId, QueueConnector, QueueError, RawDelivery};
use crate::db::{queue_repo, Database};
use crate::job::QueueMessage;

/// [`JobQueue`] backed by the `queue_messages` table.
#[derive(Clone)]
pub struct SqliteQueue {
    db: Database,
    name: String,
}

impl SqliteQueue {
    pub fn new(db: Database, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
        }
    }
}

#[async_trait]
impl JobQueue for SqliteQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, message: &QueueMessage) -> Result<MessageId, QueueError> {
        let body = message.encode()?;
        let id = queue_repo::insert(&self.db, &self.name, &body, &Utc::now().to_rfc3339())?;
        Ok(MessageId(id))
    }

    async fn claim(
        &self,
        consumer_tag: &str,
        lease: Duration,
    ) -> Result<Option<RawDelivery>, QueueError> {
        let now_ms = Utc::now().timestamp_millis();
        let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
        let lease_until_ms = now_ms.saturating_add(lease_ms);
        let row = queue_repo::claim_next(&self.db, &self.name, consumer_tag, now_ms, lease_until_ms)?;
        Ok(row.map(|row| RawDelivery {
            id: MessageId(row.id),
            body: row.body,
            delivery_count: row.delivery_count,
        }))
    }

    async fn ack(&self, id: MessageId, consumer_tag: &str) -> Result<(), QueueError> {
        if queue_repo::delete_leased(&self.db, id.0, consumer_tag)? {
            Ok(())
        } else {
            Err(QueueError::LeaseLost(id))
        }
    }

    async fn release(&self, id: MessageId, consumer_tag: &str) -> Result<(), QueueError> {
        if queue_repo::release(&self.db, id.0, consumer_tag)? {
            Ok(())
        } else {
            Err(QueueError::LeaseLost(id))
        }
    }

    async fn recover(&self, consumer_tag: &str) -> Result<usize, QueueError> {
        Ok(queue_repo::release_all(&self.db, &self.name, consumer_tag)?)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(queue_repo::count(&self.db, &self.name)?)
    }
}

/// Opens a [`SqliteQueue`] on a database file. Used by the worker to
/// (re)establish its queue connection.
pub struct SqliteConnector {
    path: PathBuf,
    name: String,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

#[async_trait]
impl QueueConnector for SqliteConnector {
    async fn connect(&self) -> Result<Arc<dyn JobQueue>, QueueError> {
        let db = Database::open(&self.path)?;
        Ok(Arc::new(SqliteQueue::new(db, self.name.clone())))
    }
}
