//! Queue repository: row-level operations on the `queue_messages` table.
//!
//! A message is "leased" while `consumer_tag` is set and `lease_until` (epoch
//! milliseconds) lies in the future. Claiming is a single `UPDATE … RETURNING`
//! so two consumers can never lease the same row.

use rusqlite::params;

use super::{Database, DatabaseError};

/// A message handed to a consumer by [`claim_next`].
#[derive(Debug, Clone)]
pub struct ClaimedRow {
    pub id: i64,
    pub body: String,
    pub delivery_count: u32,
}

/// Appends a message to the named queue and returns its id.
pub fn insert(
    db: &Database,
    queue: &str,
    body: &str,
    enqueued_at: &str,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO queue_messages (queue, body, enqueued_at, delivery_count)
             VALUES (?1, ?2, ?3, 0)",
            params![queue, body, enqueued_at],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Leases the oldest deliverable message of `queue` to `consumer_tag` until
/// `lease_until_ms`. Deliverable means never leased, released, or with a
/// lease that expired before `now_ms`.
pub fn claim_next(
    db: &Database,
    queue: &str,
    consumer_tag: &str,
    now_ms: i64,
    lease_until_ms: i64,
) -> Result<Option<ClaimedRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "UPDATE queue_messages
             SET consumer_tag = ?2, lease_until = ?4, delivery_count = delivery_count + 1
             WHERE id = (
                 SELECT id FROM queue_messages
                 WHERE queue = ?1 AND (consumer_tag IS NULL OR lease_until < ?3)
                 ORDER BY id
                 LIMIT 1
             )
             RETURNING id, body, delivery_count",
        )?;
        let mut rows = stmt.query_map(
            params![queue, consumer_tag, now_ms, lease_until_ms],
            |row| {
                Ok(ClaimedRow {
                    id: row.get(0)?,
                    body: row.get(1)?,
                    delivery_count: row.get(2)?,
                })
            },
        )?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Deletes a message still leased to `consumer_tag`. Returns `false` if the
/// lease was lost (the row was reclaimed by someone else or already gone).
pub fn delete_leased(db: &Database, id: i64, consumer_tag: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "DELETE FROM queue_messages WHERE id = ?1 AND consumer_tag = ?2",
            params![id, consumer_tag],
        )?;
        Ok(affected > 0)
    })
}

/// Returns a leased message to the queue. Returns `false` if the lease was lost.
pub fn release(db: &Database, id: i64, consumer_tag: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE queue_messages SET consumer_tag = NULL, lease_until = NULL
             WHERE id = ?1 AND consumer_tag = ?2",
            params![id, consumer_tag],
        )?;
        Ok(affected > 0)
    })
}

/// Releases every message of `queue` leased to `consumer_tag`.
pub fn release_all(db: &Database, queue: &str, consumer_tag: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE queue_messages SET consumer_tag = NULL, lease_until = NULL
             WHERE queue = ?1 AND consumer_tag = ?2",
            params![queue, consumer_tag],
        )?;
        Ok(affected)
    })
}

/// Number of unacknowledged messages in `queue`, leased or not.
pub fn count(db: &Database, queue: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM queue_messages WHERE queue = ?1",
            params![queue],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
