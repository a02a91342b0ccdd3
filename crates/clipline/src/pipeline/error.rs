use thiserror::Error;

use super::progress::JobPhase;
use crate::error::StageFailure;

/// A stage failed; the job ends `failed`.
#[derive(Error, Debug)]
#[error("{phase} failed: {failure}")]
pub struct PipelineError {
    pub phase: JobPhase,
    #[source]
    pub failure: StageFailure,
}

impl PipelineError {
    pub fn new(phase: JobPhase, failure: StageFailure) -> Self {
        Self { phase, failure }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.failure, StageFailure::Timeout(_))
    }
}
