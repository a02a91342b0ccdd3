use std::path::{Path, PathBuf};

use crate::job::JobId;
use crate::segment::{Highlight, Segment};
use crate::stages::MediaHandle;

/// State threaded through one pipeline run.
pub struct PipelineContext {
    // Input
    pub job_id: JobId,
    pub source_reference: String,
    pub scratch_dir: PathBuf,

    // Fetch result, guaranteed Some after step_fetch
    pub source: Option<MediaHandle>,

    // Analysis results, only when analysis is configured
    pub audio: Option<MediaHandle>,
    pub highlight: Option<Highlight>,

    pub segment: Option<Segment>,
    pub clip: Option<MediaHandle>,
    pub result_reference: Option<String>,
}

impl PipelineContext {
    pub fn new(job_id: JobId, source_reference: impl Into<String>, scratch_dir: &Path) -> Self {
        Self {
            job_id,
            source_reference: source_reference.into(),
            scratch_dir: scratch_dir.to_path_buf(),
            source: None,
            audio: None,
            highlight: None,
            segment: None,
            clip: None,
            result_reference: None,
        }
    }

    /// Where the cut clip is written. Fixed per job so a redelivered
    /// message overwrites rather than accumulates.
    pub fn clip_path(&self) -> PathBuf {
        self.scratch_dir.join(format!("clip-{}.mp4", self.job_id))
    }
}
