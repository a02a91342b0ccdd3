//! Submission path: validates a source reference, records the job and
//! enqueues it.

use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::error::SubmitError;
use crate::job::{JobId, JobState, QueueMessage};
use crate::queue::QueueHandle;
use crate::store::StatusStore;

/// Returned to the caller on acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub job_id: JobId,
    pub state: JobState,
}

#[derive(Clone)]
pub struct Submitter {
    store: StatusStore,
    queue: QueueHandle,
}

impl Submitter {
    pub fn new(store: StatusStore, queue: QueueHandle) -> Self {
        Self { store, queue }
    }

    /// Creates a `queued` job and publishes its message.
    ///
    /// The row is written before the message, so a worker never sees a
    /// message for a job that does not exist yet. If the publish fails the
    /// row is deleted again and the caller gets `QueueUnavailable`.
    pub async fn submit(&self, source_reference: &str) -> Result<Submission, SubmitError> {
        let source_reference = validate_reference(source_reference)?;
        let queue = self.queue.get().map_err(SubmitError::QueueUnavailable)?;

        let job = self.store.create(source_reference)?;
        let message = QueueMessage::new(job.id, source_reference);

        if let Err(e) = queue.publish(&message).await {
            warn!(job_id = %job.id, error = %e, "Publish failed, removing job row");
            if let Err(delete_err) = self.store.delete(job.id) {
                warn!(job_id = %job.id, error = %delete_err, "Failed to remove job row");
            }
            return Err(SubmitError::QueueUnavailable(e));
        }

        info!(job_id = %job.id, queue = queue.name(), "Job queued");
        Ok(Submission {
            job_id: job.id,
            state: JobState::Queued,
        })
    }
}

/// Trims the reference and requires an absolute http(s) URL with a host.
fn validate_reference(raw: &str) -> Result<&str, SubmitError> {
    let reference = raw.trim();
    if reference.is_empty() {
        return Err(SubmitError::Validation(
            "source reference is required".to_string(),
        ));
    }
    let url = Url::parse(reference)
        .map_err(|e| SubmitError::Validation(format!("'{}' is not a URL: {}", reference, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SubmitError::Validation(format!(
            "unsupported scheme '{}', expected http or https",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(SubmitError::Validation(format!(
            "'{}' has no host",
            reference
        )));
    }
    Ok(reference)
}
