//! In-process stand-ins for the yt-dlp, ffmpeg, OpenAI and file.io adapters.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use clipline::stages::{
    Analyzer, Cutter, Fetcher, Highlight, MediaHandle, Publisher, Segment, Transcoder,
};
use clipline::{JobState, StageFailure, StatusStore};

/// Writes a small file per fetch and remembers the directories it wrote to.
/// References listed in `failing` fail like an unavailable video.
#[derive(Default)]
pub struct FakeFetcher {
    failing: HashSet<String>,
    delay: Option<Duration>,
    duration: Option<f64>,
    pub dirs: Mutex<Vec<PathBuf>>,
    pub calls: Mutex<u32>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, reference: &str) -> Self {
        self.failing.insert(reference.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn scratch_dirs(&self) -> Vec<PathBuf> {
        self.dirs.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, reference: &str, dest_dir: &Path) -> Result<MediaHandle, StageFailure> {
        *self.calls.lock().unwrap() += 1;
        self.dirs.lock().unwrap().push(dest_dir.to_path_buf());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(reference) {
            return Err(StageFailure::Tool {
                program: "yt-dlp".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "ERROR: Video unavailable".to_string(),
            });
        }
        let path = dest_dir.join("source.mp4");
        std::fs::write(&path, b"fake video").map_err(|source| StageFailure::Io {
            path: path.clone(),
            source,
        })?;
        Ok(MediaHandle::new(path).with_duration(self.duration))
    }
}

/// Records the state of every job in the status store at the moment the
/// fetch runs, then fetches like [`FakeFetcher`].
pub struct ObservingFetcher {
    store: StatusStore,
    inner: FakeFetcher,
    pub seen: Mutex<Vec<JobState>>,
}

impl ObservingFetcher {
    pub fn new(store: StatusStore) -> Self {
        Self {
            store,
            inner: FakeFetcher::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<JobState> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ObservingFetcher {
    async fn fetch(&self, reference: &str, dest_dir: &Path) -> Result<MediaHandle, StageFailure> {
        let jobs = self.store.list().expect("status store readable during fetch");
        self.seen
            .lock()
            .unwrap()
            .extend(jobs.into_iter().map(|job| job.state));
        self.inner.fetch(reference, dest_dir).await
    }
}

/// Takes the `jobs` table away mid-run, then fails the fetch, so the
/// terminal write hits an unreachable store.
pub struct StoreBreakingFetcher {
    store: StatusStore,
}

impl StoreBreakingFetcher {
    pub fn new(store: StatusStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Fetcher for StoreBreakingFetcher {
    async fn fetch(&self, _reference: &str, _dest_dir: &Path) -> Result<MediaHandle, StageFailure> {
        break_jobs_table(&self.store);
        Err(StageFailure::Tool {
            program: "yt-dlp".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "ERROR: Video unavailable".to_string(),
        })
    }
}

/// Renames the `jobs` table so every status write errors.
pub fn break_jobs_table(store: &StatusStore) {
    store
        .database()
        .with_conn(|conn| {
            conn.execute_batch("ALTER TABLE jobs RENAME TO jobs_gone")?;
            Ok(())
        })
        .unwrap();
}

/// Undoes [`break_jobs_table`].
pub fn restore_jobs_table(store: &StatusStore) {
    store
        .database()
        .with_conn(|conn| {
            conn.execute_batch("ALTER TABLE jobs_gone RENAME TO jobs")?;
            Ok(())
        })
        .unwrap();
}

pub struct FakeTranscoder;

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        media: &MediaHandle,
        dest_dir: &Path,
    ) -> Result<MediaHandle, StageFailure> {
        let path = dest_dir.join("audio.mp3");
        std::fs::write(&path, b"fake audio").map_err(|source| StageFailure::Io {
            path: path.clone(),
            source,
        })?;
        Ok(MediaHandle::new(path).with_duration(media.duration))
    }
}

/// Always answers with the same highlight.
pub struct FakeAnalyzer {
    highlight: Highlight,
}

impl FakeAnalyzer {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            highlight: Highlight {
                start,
                end,
                summary: "the good part".to_string(),
            },
        }
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(&self, _media: &MediaHandle) -> Result<Highlight, StageFailure> {
        Ok(self.highlight.clone())
    }
}

#[derive(Default)]
pub struct RecordingCutter {
    pub segments: Mutex<Vec<Segment>>,
}

impl RecordingCutter {
    pub fn segments(&self) -> Vec<Segment> {
        self.segments.lock().unwrap().clone()
    }
}

#[async_trait]
impl Cutter for RecordingCutter {
    async fn cut(
        &self,
        media: &MediaHandle,
        segment: &Segment,
        output: &Path,
    ) -> Result<MediaHandle, StageFailure> {
        assert!(media.path.exists(), "cutter input must exist");
        self.segments.lock().unwrap().push(*segment);
        std::fs::write(output, b"fake clip").map_err(|source| StageFailure::Io {
            path: output.to_path_buf(),
            source,
        })?;
        Ok(MediaHandle::new(output))
    }
}

/// Returns `https://file.io/clip-<n>` for the n-th upload.
#[derive(Default)]
pub struct FakePublisher {
    uploads: Mutex<u32>,
}

impl FakePublisher {
    pub fn upload_count(&self) -> u32 {
        *self.uploads.lock().unwrap()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, media: &MediaHandle) -> Result<String, StageFailure> {
        assert!(media.path.exists(), "published clip must exist");
        let mut uploads = self.uploads.lock().unwrap();
        *uploads += 1;
        Ok(format!("https://file.io/clip-{}", *uploads))
    }
}
