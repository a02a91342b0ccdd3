//! Status store: the durable record of every job's lifecycle.
//!
//! Written by the submission path (create) and the worker (state
//! transitions), read by status queries. Every transition goes through a
//! conditional write so a terminal job can never be moved again.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::db::{job_repo, Database, DatabaseError};
use crate::job::{Job, JobId, JobState};
use crate::reconnect;

/// Result of a state write that may legitimately be refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The row was updated.
    Applied,
    /// The row already holds a terminal state and was left untouched.
    AlreadyTerminal(JobState),
    /// The row moved to a state the transition cannot start from
    /// (e.g. completing a job that is still `queued`).
    Rejected(JobState),
    /// No row exists for this id.
    Missing,
}

#[derive(Clone)]
pub struct StatusStore {
    db: Database,
}

impl StatusStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens the store at `path`, retrying with a fixed delay until it
    /// succeeds. Returns `None` only if `cancel` fires first.
    pub async fn open_with_retry(
        path: &Path,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Option<Self> {
        reconnect::retry_forever("status store", delay, cancel, move || async move {
            Database::open(path).map(Self::new)
        })
        .await
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Creates a `queued` row and returns it.
    pub fn create(&self, source_reference: &str) -> Result<Job, DatabaseError> {
        let now = Utc::now();
        let id = job_repo::insert_queued(&self.db, source_reference, &now.to_rfc3339())?;
        Ok(Job {
            id: JobId(id),
            source_reference: source_reference.to_string(),
            state: JobState::Queued,
            result_reference: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(&self, id: JobId) -> Result<Option<Job>, DatabaseError> {
        job_repo::find_by_id(&self.db, id.0)?
            .map(row_to_job)
            .transpose()
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Result<Vec<Job>, DatabaseError> {
        job_repo::list(&self.db, None)?
            .into_iter()
            .map(row_to_job)
            .collect()
    }

    /// Number of jobs currently in `state`.
    pub fn count(&self, state: JobState) -> Result<u64, DatabaseError> {
        job_repo::count_by_status(&self.db, state.as_str())
    }

    /// Removes the row. Messages already queued for it are not purged; the
    /// worker reports them as referencing a missing job.
    pub fn delete(&self, id: JobId) -> Result<bool, DatabaseError> {
        job_repo::delete(&self.db, id.0)
    }

    /// `queued | processing → processing`. Idempotent for redelivered
    /// messages.
    pub fn mark_processing(&self, id: JobId) -> Result<WriteOutcome, DatabaseError> {
        let affected = job_repo::set_processing(&self.db, id.0, &now())?;
        self.outcome(id, affected)
    }

    /// `processing → completed` with the published artifact reference.
    pub fn mark_completed(
        &self,
        id: JobId,
        result_reference: &str,
    ) -> Result<WriteOutcome, DatabaseError> {
        let affected = job_repo::set_completed(&self.db, id.0, result_reference, &now())?;
        self.outcome(id, affected)
    }

    /// `processing → failed`.
    pub fn mark_failed(&self, id: JobId) -> Result<WriteOutcome, DatabaseError> {
        let affected = job_repo::set_failed(&self.db, id.0, &now())?;
        self.outcome(id, affected)
    }

    fn outcome(&self, id: JobId, affected: usize) -> Result<WriteOutcome, DatabaseError> {
        if affected > 0 {
            return Ok(WriteOutcome::Applied);
        }
        Ok(match self.get(id)? {
            None => WriteOutcome::Missing,
            Some(job) if job.state.is_terminal() => WriteOutcome::AlreadyTerminal(job.state),
            Some(job) => WriteOutcome::Rejected(job.state),
        })
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_timestamp(id: i64, s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow {
            id,
            reason: format!("bad timestamp '{}': {}", s, e),
        })
}

fn row_to_job(row: job_repo::JobRow) -> Result<Job, DatabaseError> {
    let state = row
        .status
        .parse::<JobState>()
        .map_err(|reason| DatabaseError::CorruptRow { id: row.id, reason })?;
    Ok(Job {
        id: JobId(row.id),
        created_at: parse_timestamp(row.id, &row.created_at)?,
        updated_at: parse_timestamp(row.id, &row.updated_at)?,
        source_reference: row.source_reference,
        state,
        result_reference: row.result_reference,
    })
}
