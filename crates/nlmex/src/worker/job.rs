use std::fmt;
use std::sync::Arc;

use crate::task::TaskId;

/// The transient payload a worker needs to process one task.
///
/// Owned by exactly one worker at a time and dropped once the task reaches a
/// terminal state.
#[derive(Clone)]
pub struct ExtractionJob {
    pub task_id: TaskId,
    pub filename: String,
    pub content: Arc<[u8]>,
}

impl ExtractionJob {
    pub fn new(task_id: TaskId, filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            task_id,
            filename: filename.into(),
            content: Arc::from(content),
        }
    }
}

impl fmt::Debug for ExtractionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionJob")
            .field("task_id", &self.task_id)
            .field("filename", &self.filename)
            .field("content_len", &self.content.len())
            .finish()
    }
}
