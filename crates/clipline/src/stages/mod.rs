//! Stage adapters: thin wrappers over the external tools and services that
//! do the actual media work. Adapters know nothing about jobs or queues;
//! each takes its inputs and returns a result or a [`StageFailure`].

pub mod command;
pub mod ffmpeg;
pub mod fileio;
pub mod openai;
pub mod ytdlp;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StageFailure;
pub use crate::segment::{Highlight, Segment};

pub use ffmpeg::{FfmpegAudioExtractor, FfmpegCutter};
pub use fileio::FileIoPublisher;
pub use openai::OpenAiAnalyzer;
pub use ytdlp::YtDlpFetcher;

/// A media file produced by a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaHandle {
    pub path: PathBuf,
    /// Length in seconds, when the producing stage knows it.
    pub duration: Option<f64>,
}

impl MediaHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Downloads `reference` into `dest_dir`.
    async fn fetch(&self, reference: &str, dest_dir: &Path) -> Result<MediaHandle, StageFailure>;
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Produces the form the analyzer consumes (an audio track).
    async fn transcode(
        &self,
        media: &MediaHandle,
        dest_dir: &Path,
    ) -> Result<MediaHandle, StageFailure>;
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, media: &MediaHandle) -> Result<Highlight, StageFailure>;
}

#[async_trait]
pub trait Cutter: Send + Sync {
    /// Writes `segment` of `media` to `output`, overwriting any previous
    /// file there.
    async fn cut(
        &self,
        media: &MediaHandle,
        segment: &Segment,
        output: &Path,
    ) -> Result<MediaHandle, StageFailure>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Uploads the artifact and returns its public reference.
    async fn publish(&self, media: &MediaHandle) -> Result<String, StageFailure>;
}
