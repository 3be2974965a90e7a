//! Test harness for driving a `TaskManager` through controlled engines.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use nlmex::{
    ExtractionEngine, ExtractionError, ExtractionResult, ExtractionTask, ServiceConfig,
    TaskId, TaskManager,
};

/// How long tests wait for a task to settle before giving up.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Deterministic engine keyed on the document content.
///
/// - `b"bad format"` fails with that message
/// - `b"panic"` panics
/// - anything else yields `<nlm/>` and echoes the filename in the HTML view
#[derive(Default)]
pub struct ScriptedEngine {
    calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExtractionEngine for ScriptedEngine {
    fn extract(&self, content: &[u8], filename: &str) -> Result<ExtractionResult, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match content {
            b"bad format" => Err(ExtractionError::Message("bad format".to_string())),
            b"panic" => panic!("engine exploded"),
            _ => Ok(ExtractionResult::new("<nlm/>", format!("<p>{}</p>", filename))),
        }
    }
}

/// Upper bound on how long a gated call blocks, so a failing test cannot
/// wedge the worker threads.
const GATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine that blocks every call until the test releases it.
pub struct GatedEngine {
    gate: Receiver<()>,
    release: Sender<()>,
    entered: AtomicUsize,
}

impl GatedEngine {
    pub fn new() -> Self {
        let (release, gate) = unbounded();
        Self {
            gate,
            release,
            entered: AtomicUsize::new(0),
        }
    }

    /// Lets `n` blocked or future calls through.
    pub fn open(&self, n: usize) {
        for _ in 0..n {
            let _ = self.release.send(());
        }
    }

    /// Calls that have reached the engine so far.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

impl ExtractionEngine for GatedEngine {
    fn extract(&self, _content: &[u8], _filename: &str) -> Result<ExtractionResult, ExtractionError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.gate
            .recv_timeout(GATE_TIMEOUT)
            .map_err(|_| ExtractionError::Message("gate never opened".to_string()))?;
        Ok(ExtractionResult::new("<nlm/>", "<p/>"))
    }
}

/// A `TaskManager` plus the engine behind it.
///
/// Tests call `manager.shutdown()` themselves; a gated engine that was never
/// opened would otherwise block the drain.
pub struct TestHarness<E: ExtractionEngine + 'static> {
    pub manager: TaskManager,
    pub engine: Arc<E>,
}

impl<E: ExtractionEngine + 'static> TestHarness<E> {
    pub fn new(config: &ServiceConfig, engine: E) -> Self {
        let engine = Arc::new(engine);
        let manager = TaskManager::new(config, Arc::clone(&engine) as Arc<dyn ExtractionEngine>)
            .expect("Failed to start task manager");
        Self { manager, engine }
    }

    pub fn submit(&self, content: &[u8], filename: &str) -> TaskId {
        self.manager
            .submit(content.to_vec(), filename)
            .expect("Submission failed")
    }

    /// Waits for a terminal state and fails the test if it never arrives.
    pub fn settle(&self, id: TaskId) -> Arc<ExtractionTask> {
        let task = self
            .manager
            .wait_for(id, SETTLE_TIMEOUT)
            .expect("Task disappeared while waiting");
        assert!(
            task.is_terminal(),
            "Task {} did not settle, status {}",
            id,
            task.status
        );
        task
    }
}

/// Polls until `predicate` holds or the settle timeout passes.
pub fn wait_until(predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    predicate()
}
