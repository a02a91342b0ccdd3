pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod reconnect;
pub mod secrets;
pub mod segment;
pub mod stages;
pub mod store;
pub mod submit;
pub mod worker;

pub use config::{load_config, Config};
pub use error::{ClipError, ConfigError, Result, StageFailure, SubmitError};
pub use job::{Job, JobId, JobState, QueueMessage};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineConfig, PipelineContext};
pub use queue::{Consumer, Delivery, JobQueue, QueueError, QueueHandle, SqliteQueue};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use segment::Segment;
pub use store::{StatusStore, WriteOutcome};
pub use submit::{Submission, Submitter};
pub use worker::{Disposition, Executor, InvariantViolation, Worker, WorkerSettings, WorkerStats};
