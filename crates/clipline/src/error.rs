use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Errors surfaced to whoever calls the submission path.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Invalid source reference: {0}")]
    Validation(String),

    #[error("Queue not ready")]
    QueueUnavailable(#[source] crate::queue::QueueError),

    #[error("Status store unavailable: {0}")]
    StoreUnavailable(#[from] crate::db::DatabaseError),
}

impl SubmitError {
    /// True when the caller sent bad input (4xx); everything else is a
    /// server-side condition (5xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, SubmitError::Validation(_))
    }
}

/// Failure of a single pipeline stage. The executor treats every variant the
/// same way (the job ends `failed`); the variants only exist to make the
/// logged diagnostic useful.
#[derive(Error, Debug)]
pub enum StageFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Tool {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    #[error("{0}")]
    Other(String),
}

impl StageFailure {
    pub fn other(message: impl Into<String>) -> Self {
        StageFailure::Other(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ClipError>;
