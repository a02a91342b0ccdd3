use std::path::PathBuf;
use std::time::Duration;

use crate::config::schema::TimeoutsConfig;
use crate::config::Config;

/// Upper bound on each stage call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub fetch: Duration,
    pub transcode: Duration,
    pub analyze: Duration,
    pub cut: Duration,
    pub publish: Duration,
}

impl StageTimeouts {
    pub fn from_config(config: &TimeoutsConfig) -> Self {
        Self {
            fetch: Duration::from_secs(config.fetch_secs),
            transcode: Duration::from_secs(config.transcode_secs),
            analyze: Duration::from_secs(config.analyze_secs),
            cut: Duration::from_secs(config.cut_secs),
            publish: Duration::from_secs(config.publish_secs),
        }
    }

    /// The same limit for every stage.
    pub fn uniform(limit: Duration) -> Self {
        Self {
            fetch: limit,
            transcode: limit,
            analyze: limit,
            cut: limit,
            publish: limit,
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self::from_config(&TimeoutsConfig::default())
    }
}

pub struct PipelineConfig {
    /// Parent of the per-message scratch directories.
    pub work_directory: PathBuf,
    pub timeouts: StageTimeouts,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_directory: PathBuf::from(&config.worker.work_directory),
            timeouts: StageTimeouts::from_config(&config.timeouts),
        }
    }
}
