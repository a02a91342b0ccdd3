use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::job::JobId;

/// Fine-grained position of a job inside the pipeline. Diagnostic only;
/// the persisted state stays `processing` throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Received,
    Downloading,
    Transcoding,
    Analyzing,
    Cutting,
    Uploading,
    Done,
    Failed,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Received => "received",
            JobPhase::Downloading => "downloading",
            JobPhase::Transcoding => "transcoding",
            JobPhase::Analyzing => "analyzing",
            JobPhase::Cutting => "cutting",
            JobPhase::Uploading => "uploading",
            JobPhase::Done => "done",
            JobPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the pipeline during processing.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Phase { phase: JobPhase, message: String },
    Completed { result_reference: String },
    Failed { phase: JobPhase, error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Writes every event to the log, tagged with the job id.
pub struct LogProgress {
    job_id: JobId,
}

impl LogProgress {
    pub fn new(job_id: JobId) -> Self {
        Self { job_id }
    }
}

impl ProgressReporter for LogProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { phase, message } => {
                info!(job_id = %self.job_id, phase = %phase, "{}", message);
            }
            ProgressEvent::Completed { result_reference } => {
                info!(job_id = %self.job_id, phase = %JobPhase::Done, result = %result_reference, "Job completed");
            }
            ProgressEvent::Failed { phase, error } => {
                warn!(job_id = %self.job_id, phase = %phase, error = %error, "Job failed");
            }
        }
    }
}
