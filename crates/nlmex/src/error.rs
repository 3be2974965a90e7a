use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::task::{TaskId, TaskStatus};

#[derive(Error, Debug)]
pub enum NlmexError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
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
}

/// Errors surfaced synchronously to callers of the task manager.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No such task: {0}")]
    NoSuchTask(TaskId),

    #[error("Task {0} has expired and is no longer retained")]
    Expired(TaskId),

    #[error("Task {id} has no result yet (status: {status})")]
    NotFinished { id: TaskId, status: TaskStatus },

    #[error("Unknown result type: {0}")]
    UnknownResultType(String),

    #[error("Invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task manager is shut down")]
    ShutDown,

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Failures raised by an extraction engine.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("Failed to write NLM document: {0}")]
    XmlWriting(String),

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Message(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, NlmexError>;
