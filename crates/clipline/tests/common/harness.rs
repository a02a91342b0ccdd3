//! Test harness for isolated job lifecycle tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use clipline::db::Database;
use clipline::pipeline::{PipelineConfig, StageTimeouts};
use clipline::queue::{Consumer, JobQueue, SqliteConnector, SqliteQueue};
use clipline::{Executor, Pipeline, PipelineBuilder, QueueHandle, StatusStore, Submitter};

pub const QUEUE_NAME: &str = "video_processing_queue";

/// One on-disk database shared by the store and the queue, plus a work
/// directory for scratch files.
pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub work_dir: PathBuf,
    pub store: StatusStore,
    pub queue: Arc<dyn JobQueue>,
    pub handle: QueueHandle,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("clipline.db");
        let work_dir = temp_dir.path().join("temp");

        let db = Database::open(&db_path).expect("Failed to open database");
        let store = StatusStore::new(db.clone());
        let queue: Arc<dyn JobQueue> = Arc::new(SqliteQueue::new(db, QUEUE_NAME));
        let handle = QueueHandle::bound(queue.clone());

        Self {
            temp_dir,
            db_path,
            work_dir,
            store,
            queue,
            handle,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn submitter(&self) -> Submitter {
        Submitter::new(self.store.clone(), self.handle.clone())
    }

    pub fn connector(&self) -> SqliteConnector {
        SqliteConnector::new(&self.db_path, QUEUE_NAME)
    }

    /// Builder with the harness work directory and generous timeouts.
    pub fn pipeline(&self) -> PipelineBuilder {
        self.pipeline_with_timeout(Duration::from_secs(10))
    }

    pub fn pipeline_with_timeout(&self, limit: Duration) -> PipelineBuilder {
        PipelineBuilder::new(PipelineConfig {
            work_directory: self.work_dir.clone(),
            timeouts: StageTimeouts::uniform(limit),
        })
    }

    pub fn executor(&self, pipeline: Pipeline) -> Executor {
        Executor::new(
            self.store.clone(),
            Arc::new(pipeline),
            Duration::from_millis(10),
        )
    }

    pub fn consumer(&self, tag: &str) -> Consumer {
        Consumer::new(
            self.queue.clone(),
            tag,
            Duration::from_secs(3600),
            Duration::from_millis(5),
        )
    }

    /// Entries left in the work directory.
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(&self.work_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
