//! The task manager: the single entry point for the presentation layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::config::{RetentionPolicy, ServiceConfig};
use crate::engine::{ExtractionEngine, PdfMetadataEngine};
use crate::error::{TaskError, WorkerError};
use crate::registry::{TaskCounts, TaskEvent, TaskEventBroadcaster, TaskRegistry};
use crate::sanitize::proper_filename;
use crate::task::{ExtractionResult, ExtractionTask, ResultType, TaskId, TaskIdAllocator};
use crate::worker::{ExtractionJob, WorkerPool};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Accepts extraction jobs, runs them on the worker pool and answers status
/// queries.
///
/// `submit` returns as soon as the task is registered and queued; `get` and
/// `list` return whatever snapshot is current and never wait on a worker.
pub struct TaskManager {
    allocator: TaskIdAllocator,
    registry: Arc<TaskRegistry>,
    pool: WorkerPool,
    engine: Arc<dyn ExtractionEngine>,
}

impl TaskManager {
    pub fn new(config: &ServiceConfig, engine: Arc<dyn ExtractionEngine>) -> Result<Self, WorkerError> {
        let events = TaskEventBroadcaster::new(config.event_capacity);
        let registry = Arc::new(TaskRegistry::new(config.retention, events));
        let pool = WorkerPool::new(
            Arc::clone(&registry),
            Arc::clone(&engine),
            config.worker_count,
            config.task_timeout(),
        )?;

        info!(
            "Task manager ready: {} workers, timeout {:?}, retention {:?}",
            config.worker_count,
            config.task_timeout(),
            config.retention
        );

        Ok(Self {
            allocator: TaskIdAllocator::new(),
            registry,
            pool,
            engine,
        })
    }

    /// Task manager backed by the built-in PDF engine.
    pub fn with_pdf_engine(config: &ServiceConfig) -> Result<Self, WorkerError> {
        Self::new(config, Arc::new(PdfMetadataEngine::new()))
    }

    /// Registers a new task and queues it for extraction.
    ///
    /// `filename` is stored as given; use [`TaskManager::submit_upload`] for
    /// names straight from a client.
    pub fn submit(&self, content: Vec<u8>, filename: &str) -> Result<TaskId, TaskError> {
        if content.is_empty() {
            return Err(TaskError::InvalidInput(
                "An empty or no file sent.".to_string(),
            ));
        }

        let size = content.len();
        let filename = filename.to_string();

        let task_id = self
            .pool
            .dispatch(|| {
                let task_id = self.allocator.next();
                self.registry
                    .insert(ExtractionTask::pending(task_id, filename.clone(), size));
                ExtractionJob::new(task_id, filename, content)
            })
            .map_err(|_| TaskError::ShutDown)?;

        info!("Submitted task {} ({} bytes)", task_id, size);
        Ok(task_id)
    }

    /// Like [`TaskManager::submit`], normalising a client-supplied file name
    /// first.
    pub fn submit_upload(&self, content: Vec<u8>, original_filename: &str) -> Result<TaskId, TaskError> {
        let filename = proper_filename(original_filename);
        debug!("Created filename: {}", filename);
        self.submit(content, &filename)
    }

    pub fn get(&self, id: TaskId) -> Result<Arc<ExtractionTask>, TaskError> {
        self.registry.get(id).ok_or_else(|| {
            let evictable = matches!(
                self.registry.retention(),
                RetentionPolicy::KeepFinished { .. }
            );
            if evictable && self.allocator.was_issued(id) {
                TaskError::Expired(id)
            } else {
                TaskError::NoSuchTask(id)
            }
        })
    }

    /// All retained tasks, oldest submission first.
    pub fn list(&self) -> Vec<Arc<ExtractionTask>> {
        self.registry.list()
    }

    pub fn counts(&self) -> TaskCounts {
        TaskCounts {
            submitted: self.allocator.issued(),
            ..self.registry.counts()
        }
    }

    /// Returns the requested representation of a finished task's result.
    pub fn download(&self, id: TaskId, result_type: ResultType) -> Result<String, TaskError> {
        let task = self.get(id)?;
        match &task.result {
            Some(result) => Ok(result.payload(result_type).to_string()),
            None => Err(TaskError::NotFinished {
                id,
                status: task.status,
            }),
        }
    }

    /// Runs the engine on the calling thread, bypassing the task registry.
    pub fn extract_sync(&self, content: &[u8], filename: &str) -> Result<ExtractionResult, TaskError> {
        if content.is_empty() {
            return Err(TaskError::InvalidInput(
                "An empty or no file sent.".to_string(),
            ));
        }
        debug!("content length: {}", content.len());
        Ok(self.engine.extract(content, filename)?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.registry.events().subscribe()
    }

    /// Starts collecting terminal snapshots for later `wait_for` calls.
    ///
    /// Create the watcher before submitting when tasks may be evicted
    /// before you get around to waiting on them.
    pub fn watcher(&self) -> TaskWatcher<'_> {
        TaskWatcher {
            manager: self,
            events: self.subscribe(),
            settled: HashMap::new(),
        }
    }

    /// Waits until the task is terminal or `timeout` elapses, then returns
    /// the latest snapshot either way.
    ///
    /// A task evicted while this call is waiting is still returned in its
    /// terminal state.
    pub fn wait_for(&self, id: TaskId, timeout: Duration) -> Result<Arc<ExtractionTask>, TaskError> {
        self.watcher().wait_for(id, timeout)
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// Tasks waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.pool.queued()
    }

    /// Stops accepting submissions and waits for every queued task to finish.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }
}

/// Follows task events so terminal snapshots survive retention.
pub struct TaskWatcher<'a> {
    manager: &'a TaskManager,
    events: broadcast::Receiver<TaskEvent>,
    settled: HashMap<TaskId, Arc<ExtractionTask>>,
}

impl TaskWatcher<'_> {
    /// Same contract as [`TaskManager::wait_for`], but also answers for
    /// tasks that finished and were evicted after the watcher was created.
    pub fn wait_for(&mut self, id: TaskId, timeout: Duration) -> Result<Arc<ExtractionTask>, TaskError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.drain();
            if let Some(task) = self.settled.remove(&id) {
                return Ok(task);
            }

            match self.manager.get(id) {
                Ok(task) if task.is_terminal() || Instant::now() >= deadline => return Ok(task),
                Ok(_) => {}
                Err(TaskError::Expired(_)) => {
                    // Terminal events are published before any eviction, so
                    // it is already queued if it happened after subscribing.
                    self.drain();
                    return self.settled.remove(&id).ok_or(TaskError::Expired(id));
                }
                Err(e) => return Err(e),
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    fn drain(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if let Some(task) = event.snapshot {
                        self.settled.insert(event.task_id, task);
                    }
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!("Task watcher fell behind, {} events missed", missed);
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}
