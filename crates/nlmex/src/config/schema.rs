use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub version: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Per-task deadline for the extraction call, in seconds.
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_event_capacity() -> usize {
    256
}

impl ServiceConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            worker_count: default_worker_count(),
            task_timeout_secs: None,
            retention: RetentionPolicy::default(),
            event_capacity: default_event_capacity(),
            logging: LoggingConfig::default(),
        }
    }
}

/// How long task records are kept once they reach a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep every record for the lifetime of the process.
    #[default]
    Unbounded,
    /// Keep at most `max_finished` terminal records; the oldest-finished go
    /// first. Pending and running tasks are never evicted.
    KeepFinished { max_finished: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG` when set.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
