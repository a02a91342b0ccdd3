//! Runs one delivery through the job state machine.
//!
//! `processing` is written before any stage runs, the terminal state is
//! written after the pipeline returns, and the message is acknowledged only
//! after that write has landed. A crash anywhere in between leaves the
//! message unacknowledged, so it is redelivered and the job is picked up
//! again (or found already terminal and dropped).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::DatabaseError;
use crate::error::StageFailure;
use crate::job::{JobId, JobState, QueueMessage};
use crate::pipeline::{JobPhase, LogProgress, Pipeline, PipelineContext, PipelineError};
use crate::queue::{Delivery, QueueError};
use crate::reconnect;
use crate::store::{StatusStore, WriteOutcome};

/// A delivery that cannot be processed and must not be retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    #[error("message body is not a valid job message: {0}")]
    UndecodableMessage(String),

    #[error("job {0} has no status row")]
    MissingJob(JobId),

    #[error("job {job_id} is in state '{state}', which cannot be processed")]
    UnexpectedState { job_id: JobId, state: JobState },
}

/// What happened to a delivery. Every variant except `Requeued` means the
/// message was acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Completed {
        job_id: JobId,
        result_reference: String,
    },
    Failed {
        job_id: JobId,
        phase: JobPhase,
    },
    Skipped(InvariantViolation),
    /// Redelivery of a job that already reached a terminal state.
    AlreadyTerminal { job_id: JobId, state: JobState },
    /// Shutdown was requested while the status store was unreachable; the
    /// message went back to the queue.
    Requeued,
}

impl Disposition {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Disposition::Completed { job_id, .. }
            | Disposition::Failed { job_id, .. }
            | Disposition::AlreadyTerminal { job_id, .. } => Some(*job_id),
            Disposition::Skipped(InvariantViolation::MissingJob(job_id))
            | Disposition::Skipped(InvariantViolation::UnexpectedState { job_id, .. }) => {
                Some(*job_id)
            }
            Disposition::Skipped(InvariantViolation::UndecodableMessage(_))
            | Disposition::Requeued => None,
        }
    }
}

pub struct Executor {
    store: StatusStore,
    pipeline: Arc<Pipeline>,
    retry_delay: Duration,
}

impl Executor {
    pub fn new(store: StatusStore, pipeline: Arc<Pipeline>, retry_delay: Duration) -> Self {
        Self {
            store,
            pipeline,
            retry_delay,
        }
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Processes one delivery to completion.
    ///
    /// `cancel` never interrupts a running pipeline. It only ends the retry
    /// of a status write that keeps failing, in which case the message is
    /// requeued instead of acknowledged. Queue errors are returned so the
    /// caller can reconnect.
    pub async fn execute(
        &self,
        delivery: Delivery<'_>,
        cancel: &CancellationToken,
    ) -> Result<Disposition, QueueError> {
        let message = match QueueMessage::decode(delivery.body()) {
            Ok(message) => message,
            Err(e) => {
                let violation = InvariantViolation::UndecodableMessage(e.to_string());
                warn!(message_id = %delivery.id(), error = %violation, "Dropping message");
                acknowledge(delivery).await?;
                return Ok(Disposition::Skipped(violation));
            }
        };
        let job_id = message.job_id;

        if delivery.is_redelivery() {
            info!(
                job_id = %job_id,
                delivery_count = delivery.delivery_count(),
                "Redelivered message, resuming job"
            );
        }

        let Some(outcome) = self
            .write_with_retry(cancel, move |store| store.mark_processing(job_id))
            .await
        else {
            delivery.requeue().await?;
            return Ok(Disposition::Requeued);
        };

        match outcome {
            WriteOutcome::Applied => {}
            WriteOutcome::Missing => {
                let violation = InvariantViolation::MissingJob(job_id);
                warn!(message_id = %delivery.id(), error = %violation, "Dropping message");
                acknowledge(delivery).await?;
                return Ok(Disposition::Skipped(violation));
            }
            WriteOutcome::AlreadyTerminal(state) => {
                info!(job_id = %job_id, state = %state, "Job already finished, acknowledging");
                acknowledge(delivery).await?;
                return Ok(Disposition::AlreadyTerminal { job_id, state });
            }
            WriteOutcome::Rejected(state) => {
                let violation = InvariantViolation::UnexpectedState { job_id, state };
                warn!(message_id = %delivery.id(), error = %violation, "Dropping message");
                acknowledge(delivery).await?;
                return Ok(Disposition::Skipped(violation));
            }
        }

        let result = self.run_pipeline(&message).await;

        let reference = result.as_ref().ok().cloned();
        let terminal = self
            .write_with_retry(cancel, move |store| match reference.as_deref() {
                Some(r) => store.mark_completed(job_id, r),
                None => store.mark_failed(job_id),
            })
            .await;
        let Some(outcome) = terminal else {
            warn!(job_id = %job_id, "Shutdown before the result could be recorded, requeueing");
            delivery.requeue().await?;
            return Ok(Disposition::Requeued);
        };

        let disposition = match (outcome, result) {
            (WriteOutcome::Applied, Ok(result_reference)) => Disposition::Completed {
                job_id,
                result_reference,
            },
            (WriteOutcome::Applied, Err(e)) => Disposition::Failed {
                job_id,
                phase: e.phase,
            },
            (WriteOutcome::AlreadyTerminal(state), _) => {
                warn!(job_id = %job_id, state = %state, "Job reached a terminal state concurrently");
                Disposition::AlreadyTerminal { job_id, state }
            }
            (WriteOutcome::Missing, _) => {
                let violation = InvariantViolation::MissingJob(job_id);
                warn!(error = %violation, "Job row removed while processing");
                Disposition::Skipped(violation)
            }
            (WriteOutcome::Rejected(state), _) => {
                let violation = InvariantViolation::UnexpectedState { job_id, state };
                error!(error = %violation, "Terminal write refused");
                Disposition::Skipped(violation)
            }
        };

        acknowledge(delivery).await?;
        Ok(disposition)
    }

    /// Runs the stages inside a fresh scratch directory, which is removed
    /// before returning whatever the outcome.
    async fn run_pipeline(&self, message: &QueueMessage) -> Result<String, PipelineError> {
        let scratch = create_scratch_dir(&self.pipeline.config().work_directory, message.job_id)
            .map_err(|f| PipelineError::new(JobPhase::Received, f))?;
        debug!(job_id = %message.job_id, path = %scratch.path().display(), "Created scratch directory");

        let progress = LogProgress::new(message.job_id);
        let ctx = PipelineContext::new(message.job_id, &message.source_reference, scratch.path());
        let (result, ctx) = self.pipeline.run(ctx, &progress).await;
        drop(ctx);

        let path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove scratch directory");
        }

        if let Err(e) = &result {
            warn!(job_id = %message.job_id, phase = %e.phase, error = %e.failure, "Pipeline failed");
        }
        result
    }

    /// Attempts a status write once, then keeps retrying at the reconnect
    /// delay while the store is unreachable. `None` means `cancel` fired
    /// during the retries.
    async fn write_with_retry<F>(&self, cancel: &CancellationToken, write: F) -> Option<WriteOutcome>
    where
        F: Fn(&StatusStore) -> Result<WriteOutcome, DatabaseError>,
    {
        match write(&self.store) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, "Status store write failed");
                let write = &write;
                reconnect::retry_forever("status store", self.retry_delay, cancel, move || async move {
                    write(&self.store)
                })
                .await
            }
        }
    }
}

fn create_scratch_dir(work_directory: &Path, job_id: JobId) -> Result<tempfile::TempDir, StageFailure> {
    std::fs::create_dir_all(work_directory).map_err(|source| StageFailure::Io {
        path: work_directory.to_path_buf(),
        source,
    })?;
    tempfile::Builder::new()
        .prefix(&format!("job-{}-", job_id))
        .tempdir_in(work_directory)
        .map_err(|source| StageFailure::Io {
            path: work_directory.to_path_buf(),
            source,
        })
}

/// Acknowledges a delivery. A lost lease means another consumer owns the
/// message now; that consumer will find the job terminal and drop it.
async fn acknowledge(delivery: Delivery<'_>) -> Result<(), QueueError> {
    match delivery.ack().await {
        Ok(()) => Ok(()),
        Err(QueueError::LeaseLost(id)) => {
            warn!(message_id = %id, "Lease lost before acknowledgment");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
