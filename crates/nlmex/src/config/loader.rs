use std::path::{Path, PathBuf};

use crate::config::schema::{RetentionPolicy, ServiceConfig};
use crate::error::ConfigError;

const SUPPORTED_VERSION: &str = "1.0";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// `<platform config dir>/nlmex/config.json`, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nlmex").join("config.json"))
}

/// Loads `path` when given, otherwise the default config file when it
/// exists, otherwise built-in defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }

    match default_config_path() {
        Some(path) if path.is_file() => {
            log::debug!("Loading config from {:?}", path);
            load_config(path)
        }
        _ => Ok(ServiceConfig::default()),
    }
}

fn validate_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.task_timeout_secs == Some(0) {
        return Err(ConfigError::Validation {
            message: "task_timeout_secs must be greater than 0".to_string(),
        });
    }

    if let RetentionPolicy::KeepFinished { max_finished: 0 } = config.retention {
        return Err(ConfigError::Validation {
            message: "retention.max_finished must be at least 1".to_string(),
        });
    }

    if config.event_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "event_capacity must be at least 1".to_string(),
        });
    }

    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.logging.filter) {
        return Err(ConfigError::Validation {
            message: format!("Invalid logging filter '{}': {}", config.logging.filter, e),
        });
    }

    Ok(())
}
