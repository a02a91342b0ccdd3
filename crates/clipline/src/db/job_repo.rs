//! Job repository: row-level operations on the `jobs` table.
//!
//! State writes are conditional `UPDATE`s: the `WHERE` clause carries the set
//! of states the transition may start from, so a rejected write affects zero
//! rows instead of silently overwriting a terminal state.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: i64,
    pub source_reference: String,
    pub status: String,
    pub result_reference: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            source_reference: row.get("source_reference")?,
            status: row.get("status")?,
            result_reference: row.get("result_reference")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a new `queued` job and returns its id.
pub fn insert_queued(
    db: &Database,
    source_reference: &str,
    created_at: &str,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (source_reference, status, result_reference, created_at, updated_at)
             VALUES (?1, 'queued', NULL, ?2, ?2)",
            params![source_reference, created_at],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists jobs newest first. `limit` of `None` returns every row.
pub fn list(db: &Database, limit: Option<u64>) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare("SELECT * FROM jobs ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes a job row. Returns whether a row was removed.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    })
}

/// `queued | processing → processing`. Returns the number of rows changed.
pub fn set_processing(db: &Database, id: i64, updated_at: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE jobs SET status = 'processing', updated_at = ?2
             WHERE id = ?1 AND status IN ('queued', 'processing')",
            params![id, updated_at],
        )?;
        Ok(affected)
    })
}

/// `processing → completed`, recording the artifact reference.
pub fn set_completed(
    db: &Database,
    id: i64,
    result_reference: &str,
    updated_at: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE jobs SET status = 'completed', result_reference = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![id, result_reference, updated_at],
        )?;
        Ok(affected)
    })
}

/// `processing → failed`. The `CHECK` constraint forbids a reference on a
/// failed row, so it is cleared in the same statement.
pub fn set_failed(db: &Database, id: i64, updated_at: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE jobs SET status = 'failed', result_reference = NULL, updated_at = ?2
             WHERE id = ?1 AND status = 'processing'",
            params![id, updated_at],
        )?;
        Ok(affected)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
