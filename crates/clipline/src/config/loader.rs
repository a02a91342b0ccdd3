use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "CLIPLINE_CONFIG";

/// `$CLIPLINE_CONFIG` if set, else `~/.clipline/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|h| h.join(".clipline").join("config.json"))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker.consumer_name.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "worker.consumer_name must not be empty".to_string(),
        });
    }

    if config.queue.poll_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "queue.poll_interval_ms must be greater than zero".to_string(),
        });
    }

    if config.queue.reconnect_delay_secs == 0 {
        return Err(ConfigError::Validation {
            message: "queue.reconnect_delay_secs must be greater than zero".to_string(),
        });
    }

    let t = &config.timeouts;
    for (name, secs) in [
        ("fetch_secs", t.fetch_secs),
        ("transcode_secs", t.transcode_secs),
        ("analyze_secs", t.analyze_secs),
        ("cut_secs", t.cut_secs),
        ("publish_secs", t.publish_secs),
    ] {
        if secs == 0 {
            return Err(ConfigError::Validation {
                message: format!("timeouts.{} must be greater than zero", name),
            });
        }
    }

    // A live worker must never lose its lease mid-pipeline.
    if config.queue.visibility_timeout_secs <= t.total_secs() {
        return Err(ConfigError::Validation {
            message: format!(
                "queue.visibility_timeout_secs ({}) must exceed the sum of stage timeouts ({})",
                config.queue.visibility_timeout_secs,
                t.total_secs()
            ),
        });
    }

    if config.analysis.enabled {
        url::Url::parse(&config.analysis.base_url).map_err(|e| ConfigError::Validation {
            message: format!("analysis.base_url is not a valid URL: {}", e),
        })?;
    }
    url::Url::parse(&config.publish.endpoint).map_err(|e| ConfigError::Validation {
        message: format!("publish.endpoint is not a valid URL: {}", e),
    })?;

    Ok(())
}
