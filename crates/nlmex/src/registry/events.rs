//! Task event broadcaster for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::task::{ExtractionTask, TaskId, TaskStatus};

/// Emitted whenever a task is registered or changes state.
///
/// Terminal events carry the committed snapshot, so a subscriber still sees
/// the result of a task the retention policy has already evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub filename: String,
    pub status: TaskStatus,
    pub timestamp: DateTime<Utc>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub snapshot: Option<Arc<ExtractionTask>>,
}

impl TaskEvent {
    pub fn from_task(task: &Arc<ExtractionTask>) -> Self {
        let timestamp = match task.status {
            TaskStatus::Pending => task.submitted_at,
            TaskStatus::Running => task.started_at.unwrap_or_else(Utc::now),
            TaskStatus::Finished | TaskStatus::Failed => {
                task.completed_at.unwrap_or_else(Utc::now)
            }
        };

        Self {
            task_id: task.id,
            filename: task.filename.clone(),
            status: task.status,
            timestamp,
            error: task.error.as_ref().map(|e| e.message.clone()),
            snapshot: task.is_terminal().then(|| Arc::clone(task)),
        }
    }
}

/// Broadcasts task events to any number of subscribers.
#[derive(Clone)]
pub struct TaskEventBroadcaster {
    sender: Arc<broadcast::Sender<TaskEvent>>,
}

impl TaskEventBroadcaster {
    /// Creates a broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publishes `event`. Having no subscribers is normal.
    pub fn send(&self, event: TaskEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("Task event dropped, nobody is subscribed");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TaskEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
