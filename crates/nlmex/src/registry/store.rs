//! In-memory task registry.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::config::RetentionPolicy;
use crate::error::TaskError;
use crate::registry::events::{TaskEvent, TaskEventBroadcaster};
use crate::task::{ExtractionTask, TaskId, TaskStatus};

/// Number of tasks per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    pub pending: usize,
    pub running: usize,
    pub finished: usize,
    pub failed: usize,
    /// Terminal tasks dropped by the retention policy.
    pub evicted: u64,
    /// Ids handed out since startup, evicted tasks included.
    pub submitted: u64,
}

impl TaskCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.finished + self.failed
    }
}

#[derive(Default)]
struct RegistryState {
    tasks: BTreeMap<TaskId, Arc<ExtractionTask>>,
    /// Terminal task ids in the order they reached their terminal state.
    finished_order: VecDeque<TaskId>,
    evicted: u64,
}

/// Owns every task record, keyed by id.
///
/// Records are immutable `Arc` snapshots. A transition replaces the whole
/// record under the write lock, so readers see either the old or the new
/// snapshot and nothing in between.
pub struct TaskRegistry {
    state: RwLock<RegistryState>,
    retention: RetentionPolicy,
    events: TaskEventBroadcaster,
}

impl TaskRegistry {
    pub fn new(retention: RetentionPolicy, events: TaskEventBroadcaster) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            retention,
            events,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    pub fn events(&self) -> &TaskEventBroadcaster {
        &self.events
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RegistryState> {
        match self.state.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Task registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RegistryState> {
        match self.state.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Task registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Registers a newly submitted task. An id that is already registered
    /// keeps its existing record.
    pub fn insert(&self, task: ExtractionTask) -> Arc<ExtractionTask> {
        let task = Arc::new(task);
        let stored = {
            let mut state = self.write_state();
            Arc::clone(
                state
                    .tasks
                    .entry(task.id)
                    .or_insert_with(|| Arc::clone(&task)),
            )
        };

        if Arc::ptr_eq(&stored, &task) {
            self.events.send(TaskEvent::from_task(&stored));
        } else {
            log::error!("Task {} is already registered, keeping existing record", task.id);
        }
        stored
    }

    /// Replaces a record with its next snapshot.
    ///
    /// Fails if the task is unknown or the status change is not a legal
    /// forward transition from the currently stored status.
    pub fn commit(&self, next: ExtractionTask) -> Result<Arc<ExtractionTask>, TaskError> {
        let next = Arc::new(next);
        {
            let mut state = self.write_state();
            let current = state
                .tasks
                .get(&next.id)
                .ok_or(TaskError::NoSuchTask(next.id))?;

            if !current.status.can_advance_to(next.status) {
                return Err(TaskError::InvalidTransition {
                    id: next.id,
                    from: current.status,
                    to: next.status,
                });
            }

            state.tasks.insert(next.id, Arc::clone(&next));

            // Published under the lock: a task's terminal event always
            // precedes the commit that evicts it.
            self.events.send(TaskEvent::from_task(&next));

            if next.is_terminal() {
                state.finished_order.push_back(next.id);
                self.apply_retention(&mut state);
            }
        }

        Ok(next)
    }

    fn apply_retention(&self, state: &mut RegistryState) {
        let RetentionPolicy::KeepFinished { max_finished } = self.retention else {
            return;
        };

        while state.finished_order.len() > max_finished {
            let Some(oldest) = state.finished_order.pop_front() else {
                break;
            };
            if state.tasks.remove(&oldest).is_some() {
                state.evicted += 1;
                log::debug!("Evicted finished task {}", oldest);
            }
        }
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<ExtractionTask>> {
        self.read_state().tasks.get(&id).cloned()
    }

    /// Snapshot of all tasks, oldest submission first.
    pub fn list(&self) -> Vec<Arc<ExtractionTask>> {
        self.read_state().tasks.values().cloned().collect()
    }

    pub fn counts(&self) -> TaskCounts {
        let state = self.read_state();
        let mut counts = TaskCounts {
            evicted: state.evicted,
            ..TaskCounts::default()
        };
        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Finished => counts.finished += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ErrorInfo, ErrorKind, ExtractionResult};

    fn registry() -> TaskRegistry {
        TaskRegistry::new(RetentionPolicy::Unbounded, TaskEventBroadcaster::new(64))
    }

    fn finish(registry: &TaskRegistry, id: TaskId) {
        let running = registry.get(id).unwrap().start().unwrap();
        let running = registry.commit(running).unwrap();
        registry
            .commit(running.finish(ExtractionResult::new("<nlm/>", "")).unwrap())
            .unwrap();
    }

    #[test]
    fn test_insert_and_get() {
        let registry = registry();
        assert!(registry.list().is_empty());

        registry.insert(ExtractionTask::pending(TaskId::new(1), "a.pdf", 1));

        let task = registry.get(TaskId::new(1)).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(registry.get(TaskId::new(2)).is_none());
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_duplicate_insert_keeps_original() {
        let registry = registry();
        registry.insert(ExtractionTask::pending(TaskId::new(1), "a.pdf", 1));
        let stored = registry.insert(ExtractionTask::pending(TaskId::new(1), "b.pdf", 1));

        assert_eq!(stored.filename, "a.pdf");
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_list_is_ordered_by_id() {
        let registry = registry();
        for id in [3, 1, 2] {
            registry.insert(ExtractionTask::pending(TaskId::new(id), "a.pdf", 1));
        }

        let ids: Vec<u64> = registry.list().iter().map(|t| t.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_commit_replaces_snapshot() {
        let registry = registry();
        let pending = registry.insert(ExtractionTask::pending(TaskId::new(1), "a.pdf", 1));

        registry.commit(pending.start().unwrap()).unwrap();

        // The old snapshot is untouched; the registry serves the new one.
        assert_eq!(pending.status, TaskStatus::Pending);
        assert_eq!(registry.get(TaskId::new(1)).unwrap().status, TaskStatus::Running);
    }

    #[test]
    fn test_commit_rejects_stale_transition() {
        let registry = registry();
        let pending = registry.insert(ExtractionTask::pending(TaskId::new(1), "a.pdf", 1));
        let running = pending.start().unwrap();
        registry.commit(running.clone()).unwrap();

        // Committing Running again is not a forward move.
        match registry.commit(running) {
            Err(TaskError::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, TaskStatus::Running);
                assert_eq!(to, TaskStatus::Running);
            }
            other => panic!("Expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_commit_unknown_task() {
        let registry = registry();
        let orphan = ExtractionTask::pending(TaskId::new(5), "a.pdf", 1)
            .start()
            .unwrap();

        assert!(matches!(
            registry.commit(orphan),
            Err(TaskError::NoSuchTask(id)) if id == TaskId::new(5)
        ));
    }

    #[test]
    fn test_counts() {
        let registry = registry();
        for id in 1..=4 {
            registry.insert(ExtractionTask::pending(TaskId::new(id), "a.pdf", 1));
        }
        finish(&registry, TaskId::new(1));

        let running = registry.get(TaskId::new(2)).unwrap().start().unwrap();
        let running = registry.commit(running).unwrap();
        registry
            .commit(
                running
                    .fail(ErrorInfo::new(ErrorKind::ExtractionFailure, "x"))
                    .unwrap(),
            )
            .unwrap();

        let running = registry.get(TaskId::new(3)).unwrap().start().unwrap();
        registry.commit(running).unwrap();

        let counts = registry.counts();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.finished, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.evicted, 0);
    }

    #[test]
    fn test_retention_evicts_oldest_finished_first() {
        let registry = TaskRegistry::new(
            RetentionPolicy::KeepFinished { max_finished: 2 },
            TaskEventBroadcaster::new(64),
        );
        for id in 1..=5 {
            registry.insert(ExtractionTask::pending(TaskId::new(id), "a.pdf", 1));
        }

        // Finish out of submission order: 3, 1, 4.
        finish(&registry, TaskId::new(3));
        finish(&registry, TaskId::new(1));
        assert_eq!(registry.list().len(), 5);

        finish(&registry, TaskId::new(4));

        // Task 3 finished first, so it goes first.
        assert!(registry.get(TaskId::new(3)).is_none());
        assert!(registry.get(TaskId::new(1)).is_some());
        assert!(registry.get(TaskId::new(4)).is_some());
        // Unfinished tasks are never evicted.
        assert!(registry.get(TaskId::new(2)).is_some());
        assert!(registry.get(TaskId::new(5)).is_some());
        assert_eq!(registry.counts().evicted, 1);
    }

    #[test]
    fn test_events_follow_transitions() {
        let registry = registry();
        let mut rx = registry.events().subscribe();

        registry.insert(ExtractionTask::pending(TaskId::new(1), "a.pdf", 1));
        finish(&registry, TaskId::new(1));

        let statuses: Vec<TaskStatus> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.status)
            .collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Pending, TaskStatus::Running, TaskStatus::Finished]
        );
    }

    #[test]
    fn test_evicted_task_snapshot_survives_in_event() {
        let registry = TaskRegistry::new(
            RetentionPolicy::KeepFinished { max_finished: 1 },
            TaskEventBroadcaster::new(64),
        );
        let mut rx = registry.events().subscribe();

        registry.insert(ExtractionTask::pending(TaskId::new(1), "a.pdf", 1));
        registry.insert(ExtractionTask::pending(TaskId::new(2), "b.pdf", 1));
        finish(&registry, TaskId::new(1));
        finish(&registry, TaskId::new(2));
        assert!(registry.get(TaskId::new(1)).is_none());

        let finished: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|e| e.snapshot)
            .collect();
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[0].id, TaskId::new(1));
        assert_eq!(finished[0].status, TaskStatus::Finished);
        assert!(finished[0].result.is_some());
    }

    #[test]
    fn test_rejected_commit_sends_no_event() {
        let registry = registry();
        let pending = registry.insert(ExtractionTask::pending(TaskId::new(1), "a.pdf", 1));
        let mut rx = registry.events().subscribe();

        let bogus = ExtractionTask {
            status: TaskStatus::Finished,
            ..(*pending).clone()
        };
        assert!(registry.commit(bogus).is_err());
        assert!(rx.try_recv().is_err());
    }
}
