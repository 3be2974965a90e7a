//! Task records and their state machine.
//!
//! An [`ExtractionTask`] is an immutable snapshot. Every transition builds a
//! new snapshot from the previous one, which the registry then swaps in
//! atomically, so readers never observe a half-updated record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ExtractionError, TaskError};
use crate::task::id::TaskId;
use crate::task::result::ExtractionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Finished,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed)
    }

    /// Allowed moves: Pending -> Running -> Finished | Failed.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Finished)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => f.pad("pending"),
            TaskStatus::Running => f.pad("running"),
            TaskStatus::Finished => f.pad("finished"),
            TaskStatus::Failed => f.pad("failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The engine reported a failure.
    ExtractionFailure,
    /// The engine exceeded the configured deadline.
    Timeout,
    /// The engine panicked.
    WorkerPanic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ExtractionFailure => write!(f, "extraction failure"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::WorkerPanic => write!(f, "worker panic"),
        }
    }
}

/// User-facing description of why a task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&ExtractionError> for ErrorInfo {
    fn from(err: &ExtractionError) -> Self {
        let kind = match err {
            ExtractionError::Timeout(_) => ErrorKind::Timeout,
            _ => ErrorKind::ExtractionFailure,
        };
        Self::new(kind, err.to_string())
    }
}

/// Snapshot of one submitted extraction job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionTask {
    pub id: TaskId,
    pub status: TaskStatus,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub size_bytes: usize,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ExtractionTask {
    /// Creates a freshly submitted task.
    pub fn pending(id: TaskId, filename: impl Into<String>, size_bytes: usize) -> Self {
        let filename = filename.into();
        let mime_type = mime_guess::from_path(&filename)
            .first()
            .map(|m| m.to_string());

        Self {
            id,
            status: TaskStatus::Pending,
            filename,
            mime_type,
            size_bytes,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == TaskStatus::Finished
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Snapshot in `Running` state.
    pub fn start(&self) -> Result<Self, TaskError> {
        self.check_transition(TaskStatus::Running)?;
        Ok(Self {
            status: TaskStatus::Running,
            started_at: Some(Utc::now()),
            ..self.clone()
        })
    }

    /// Snapshot in `Finished` state carrying `result`.
    pub fn finish(&self, result: ExtractionResult) -> Result<Self, TaskError> {
        self.check_transition(TaskStatus::Finished)?;
        Ok(Self {
            status: TaskStatus::Finished,
            completed_at: Some(Utc::now()),
            result: Some(result),
            error: None,
            ..self.clone()
        })
    }

    /// Snapshot in `Failed` state carrying `error`.
    pub fn fail(&self, error: ErrorInfo) -> Result<Self, TaskError> {
        self.check_transition(TaskStatus::Failed)?;
        Ok(Self {
            status: TaskStatus::Failed,
            completed_at: Some(Utc::now()),
            result: None,
            error: Some(error),
            ..self.clone()
        })
    }

    fn check_transition(&self, to: TaskStatus) -> Result<(), TaskError> {
        if self.status.can_advance_to(to) {
            Ok(())
        } else {
            Err(TaskError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            })
        }
    }
}
