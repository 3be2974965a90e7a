use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::engine::ExtractionEngine;
use crate::error::WorkerError;
use crate::registry::TaskRegistry;
use crate::sanitize::redact_filename;
use crate::task::{ErrorInfo, ErrorKind, ExtractionResult, TaskId};
use crate::worker::job::ExtractionJob;

/// Extraction helper threads allowed per worker. One is in use by the
/// worker itself; the rest may still be running after a timeout.
const HELPERS_PER_WORKER: usize = 2;

/// Everything a worker thread needs, shared between all of them.
struct WorkerContext {
    registry: Arc<TaskRegistry>,
    engine: Arc<dyn ExtractionEngine>,
    task_timeout: Option<Duration>,
    helpers: Arc<AtomicUsize>,
    max_helpers: usize,
}

/// One live extraction helper thread. Released when the thread ends,
/// including after a timeout when nobody waits for it anymore.
struct HelperSlot(Arc<AtomicUsize>);

impl HelperSlot {
    fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| HelperSlot(Arc::clone(counter)))
    }
}

impl Drop for HelperSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fixed set of worker threads pulling extraction jobs from a shared queue.
///
/// The queue is unbounded so dispatching never blocks. Jobs wait in the
/// queue, with their task still `Pending`, until a worker is free.
pub struct WorkerPool {
    job_sender: RwLock<Option<Sender<ExtractionJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(
        registry: Arc<TaskRegistry>,
        engine: Arc<dyn ExtractionEngine>,
        worker_count: usize,
        task_timeout: Option<Duration>,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be > 0".to_string(),
            ));
        }

        let (job_sender, job_receiver) = unbounded::<ExtractionJob>();
        let context = Arc::new(WorkerContext {
            registry,
            engine,
            task_timeout,
            helpers: Arc::new(AtomicUsize::new(0)),
            max_helpers: worker_count * HELPERS_PER_WORKER,
        });

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let worker_context = Arc::clone(&context);

            let handle = thread::Builder::new()
                .name(format!("nlmex-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, job_rx, worker_context))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} extraction workers", worker_count);

        Ok(Self {
            job_sender: RwLock::new(Some(job_sender)),
            workers: Mutex::new(workers),
            worker_count,
        })
    }

    /// Registers and enqueues a job.
    ///
    /// `register` runs while the queue is guaranteed open, so a task it
    /// creates is always picked up by a worker, even if `shutdown` is called
    /// concurrently.
    pub fn dispatch<F>(&self, register: F) -> Result<TaskId, WorkerError>
    where
        F: FnOnce() -> ExtractionJob,
    {
        let guard = self.job_sender.read().unwrap_or_else(|poisoned| {
            warn!("Worker pool sender lock was poisoned, recovering");
            poisoned.into_inner()
        });
        let sender = guard.as_ref().ok_or(WorkerError::ChannelClosed)?;

        let job = register();
        let task_id = job.task_id;
        sender.send(job).map_err(|_| WorkerError::ChannelClosed)?;
        Ok(task_id)
    }

    /// Stops accepting jobs, lets the workers drain the queue and waits for
    /// them to exit. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let sender = self
            .job_sender
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if sender.is_none() {
            return;
        }
        info!("Shutting down worker pool...");
        // Dropping the last sender lets workers exit once the queue is empty.
        drop(sender);

        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();

        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.job_sender
            .read()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Jobs waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.job_sender
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(Sender::len))
            .unwrap_or(0)
    }
}

fn run_worker(worker_id: usize, job_receiver: Receiver<ExtractionJob>, context: Arc<WorkerContext>) {
    debug!("Worker {} started", worker_id);

    // Ends once every sender is gone and the queue is drained.
    for job in job_receiver.iter() {
        process_job(worker_id, &context, job);
    }

    debug!("Worker {} stopped", worker_id);
}

fn process_job(worker_id: usize, context: &WorkerContext, job: ExtractionJob) {
    let _span = tracing::info_span!(
        "worker.task",
        worker = worker_id,
        task_id = %job.task_id,
        filename = %redact_filename(&job.filename)
    )
    .entered();

    let Some(pending) = context.registry.get(job.task_id) else {
        error!("Worker {} got job for unknown task {}", worker_id, job.task_id);
        return;
    };

    let running = match pending
        .start()
        .and_then(|next| context.registry.commit(next))
    {
        Ok(running) => running,
        Err(e) => {
            error!("Worker {} could not start task {}: {}", worker_id, job.task_id, e);
            return;
        }
    };

    debug!("Worker {} processing task {}", worker_id, job.task_id);

    let next = match run_extraction(context, &job) {
        Ok(result) => running.finish(result),
        Err(info) => {
            warn!("Task {} failed ({}): {}", job.task_id, info.kind, info.message);
            running.fail(info)
        }
    };

    match next.and_then(|next| context.registry.commit(next)) {
        Ok(task) => info!("Task {} is {}", task.id, task.status),
        Err(e) => error!("Worker {} could not complete task {}: {}", worker_id, job.task_id, e),
    }
}

fn run_extraction(context: &WorkerContext, job: &ExtractionJob) -> Result<ExtractionResult, ErrorInfo> {
    let Some(limit) = context.task_timeout else {
        return guarded_extract(context.engine.as_ref(), &job.content, &job.filename);
    };

    // The engine runs on a helper thread so the worker can stop waiting at
    // the deadline. A late result is dropped with the channel.
    let Some(slot) = HelperSlot::acquire(&context.helpers, context.max_helpers) else {
        return Err(ErrorInfo::new(
            ErrorKind::ExtractionFailure,
            format!(
                "Too many timed-out extractions still running ({}), not starting another",
                context.max_helpers
            ),
        ));
    };

    let (result_tx, result_rx) = bounded(1);
    let engine = Arc::clone(&context.engine);
    let content = Arc::clone(&job.content);
    let filename = job.filename.clone();

    thread::Builder::new()
        .name(format!("nlmex-extract-{}", job.task_id))
        .spawn(move || {
            let _slot = slot;
            let outcome = guarded_extract(engine.as_ref(), &content, &filename);
            let _ = result_tx.send(outcome);
        })
        .map_err(|e| {
            ErrorInfo::new(
                ErrorKind::ExtractionFailure,
                format!("Failed to start extraction: {}", e),
            )
        })?;

    match result_rx.recv_timeout(limit) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => Err(ErrorInfo::new(
            ErrorKind::Timeout,
            format!("Extraction timed out after {:?}", limit),
        )),
        Err(RecvTimeoutError::Disconnected) => Err(ErrorInfo::new(
            ErrorKind::WorkerPanic,
            "Extraction stopped without producing a result",
        )),
    }
}

/// Runs the engine, turning errors and panics into task error info.
fn guarded_extract(
    engine: &dyn ExtractionEngine,
    content: &[u8],
    filename: &str,
) -> Result<ExtractionResult, ErrorInfo> {
    match panic::catch_unwind(AssertUnwindSafe(|| engine.extract(content, filename))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(ErrorInfo::from(&e)),
        Err(payload) => Err(ErrorInfo::new(
            ErrorKind::WorkerPanic,
            format!("Extraction engine panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
