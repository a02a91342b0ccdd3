//! ffmpeg-backed transcoder and cutter.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use super::command::run_tool;
use super::{Cutter, MediaHandle, Segment, Transcoder};
use crate::error::StageFailure;

fn base_args() -> Vec<String> {
    ["-y", "-hide_banner", "-nostats", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Extracts the audio track as MP3 for transcription.
pub struct FfmpegAudioExtractor {
    program: String,
}

impl FfmpegAudioExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = base_args();
        args.extend(["-i".to_string(), path_arg(input)]);
        args.push("-vn".to_string());
        args.extend(["-c:a".to_string(), "libmp3lame".to_string()]);
        args.push(path_arg(output));
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegAudioExtractor {
    async fn transcode(
        &self,
        media: &MediaHandle,
        dest_dir: &Path,
    ) -> Result<MediaHandle, StageFailure> {
        let output = dest_dir.join("audio.mp3");
        run_tool(&self.program, &self.build_args(&media.path, &output)).await?;
        info!(path = %output.display(), "Extracted audio track");
        Ok(MediaHandle::new(output).with_duration(media.duration))
    }
}

/// Cuts a segment out of the source and re-encodes it.
pub struct FfmpegCutter {
    program: String,
}

impl FfmpegCutter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn build_args(&self, input: &Path, segment: &Segment, output: &Path) -> Vec<String> {
        let mut args = base_args();
        args.extend(["-ss".to_string(), format!("{:.3}", segment.start())]);
        args.extend(["-i".to_string(), path_arg(input)]);
        args.extend(["-t".to_string(), format!("{:.3}", segment.duration())]);
        args.extend(["-c:v".to_string(), "libx264".to_string()]);
        args.extend(["-c:a".to_string(), "aac".to_string()]);
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        args.push(path_arg(output));
        args
    }
}

#[async_trait]
impl Cutter for FfmpegCutter {
    async fn cut(
        &self,
        media: &MediaHandle,
        segment: &Segment,
        output: &Path,
    ) -> Result<MediaHandle, StageFailure> {
        run_tool(&self.program, &self.build_args(&media.path, segment, output)).await?;
        info!(
            path = %output.display(),
            start = segment.start(),
            end = segment.end(),
            "Cut segment"
        );
        Ok(MediaHandle::new(output).with_duration(Some(segment.duration())))
    }
}
