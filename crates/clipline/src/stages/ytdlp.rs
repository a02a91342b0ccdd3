use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::command::run_tool;
use super::{Fetcher, MediaHandle};
use crate::error::StageFailure;

/// Base name of the downloaded file inside the scratch directory. yt-dlp
/// fills in the extension.
const OUTPUT_TEMPLATE: &str = "source.%(ext)s";

/// Downloads media with the `yt-dlp` CLI.
pub struct YtDlpFetcher {
    program: String,
    cookies_file: Option<PathBuf>,
}

impl YtDlpFetcher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            cookies_file: None,
        }
    }

    /// Passes a Netscape-format cookies file to every download.
    pub fn with_cookies_file(mut self, path: Option<PathBuf>) -> Self {
        self.cookies_file = path;
        self
    }

    pub fn build_args(&self, reference: &str, dest_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            "best[ext=mp4]/best".to_string(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            "duration".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "-o".to_string(),
            dest_dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned(),
        ];
        if let Some(ref cookies) = self.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }
        args.push("--".to_string());
        args.push(reference.to_string());
        args
    }
}

/// Splits the `--print` output: the first line is the duration (`NA` when
/// unknown), the last line is the final file path.
fn parse_print_output(stdout: &str) -> Result<(PathBuf, Option<f64>), StageFailure> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let (first, last) = match (lines.first(), lines.last()) {
        (Some(first), Some(last)) if lines.len() >= 2 => (*first, *last),
        _ => {
            return Err(StageFailure::InvalidResponse(format!(
                "yt-dlp printed no file path: {:?}",
                stdout
            )))
        }
    };
    let duration = first.parse::<f64>().ok().filter(|d| d.is_finite() && *d > 0.0);
    Ok((PathBuf::from(last), duration))
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch(&self, reference: &str, dest_dir: &Path) -> Result<MediaHandle, StageFailure> {
        let args = self.build_args(reference, dest_dir);
        let stdout = run_tool(&self.program, &args).await?;
        let (path, duration) = parse_print_output(&stdout)?;

        if !path.is_file() {
            return Err(StageFailure::InvalidResponse(format!(
                "yt-dlp reported '{}' but no such file exists",
                path.display()
            )));
        }

        info!(path = %path.display(), duration = ?duration, "Downloaded source media");
        Ok(MediaHandle::new(path).with_duration(duration))
    }
}
