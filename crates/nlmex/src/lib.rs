pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod registry;
pub mod sanitize;
pub mod task;
pub mod telemetry;
pub mod worker;

pub use config::{load_config, LoggingConfig, RetentionPolicy, ServiceConfig};
pub use engine::{ExtractionEngine, PdfMetadataEngine};
pub use error::{ConfigError, ExtractionError, NlmexError, Result, TaskError, WorkerError};
pub use manager::{TaskManager, TaskWatcher};
pub use registry::{TaskCounts, TaskEvent};
pub use task::{
    ErrorInfo, ErrorKind, ExtractionResult, ExtractionTask, ResultType, TaskId, TaskStatus,
};
