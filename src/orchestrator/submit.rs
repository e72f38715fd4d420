//! Enqueue path shared by the orchestrator, task bodies and the log router.
//!
//! Every accepted push happens under the `proc` lock and is checked against
//! `proc.task_id_counter`: the heap's seq must equal the tracked counter,
//! otherwise an update was lost and the push fails with `IdConflict`. The
//! queue depth check and the shelf entry are taken under the same lock.

use std::sync::Arc;
use tracing::{debug, error};

use crate::constants::{proc_keys, run_keys, shelf_state};
use crate::error::{OrchestraError, Result};
use crate::heap::{PriorityHeap, PushOutcome};
use crate::log_router::LogRecord;
use crate::state::GlobalState;
use crate::task::{Fingerprint, Task, TaskPayload};

#[derive(Clone)]
pub struct Submitter {
    state: GlobalState,
    heap: Arc<PriorityHeap>,
    max_queue_depth: usize,
}

impl Submitter {
    pub fn new(state: GlobalState, heap: Arc<PriorityHeap>, max_queue_depth: usize) -> Self {
        Self {
            state,
            heap,
            max_queue_depth,
        }
    }

    /// Rebuild from shared state: heap by `proc.heap_name`, limits from `conf`
    pub fn attach(state: &GlobalState) -> Result<Self> {
        let heap = PriorityHeap::attach(&state.proc_str(proc_keys::HEAP_NAME)?)?;
        let max_queue_depth = state.config()?.scheduler.max_queue_depth;
        Ok(Self::new(state.clone(), heap, max_queue_depth))
    }

    pub fn heap(&self) -> &Arc<PriorityHeap> {
        &self.heap
    }

    /// Queue an application task. Fails with `PoolExhausted` once the heap
    /// holds `max_queue_depth` application entries.
    pub fn submit(
        &self,
        task: Task,
        priority: i64,
        fingerprint: Option<Fingerprint>,
    ) -> Result<PushOutcome> {
        let fingerprint = fingerprint.unwrap_or_else(|| task.fingerprint());
        let callable = task.callable.clone();
        let is_process = task.is_process;
        let limit = self.max_queue_depth;
        let outcome = self.tracked(Some(&fingerprint), |heap| {
            let queued = heap.application_len();
            if queued >= limit {
                return Err(OrchestraError::PoolExhausted { queued, limit });
            }
            heap.push(TaskPayload::Task(task), priority, fingerprint.clone(), is_process)
        })?;

        if let PushOutcome::Queued { seq, priority } = outcome {
            self.state.bump(run_keys::TASKS_CREATED, 1)?;
            debug!(callable = %callable, seq, priority, "📨 SUBMIT: Task queued");
        } else {
            debug!(callable = %callable, fingerprint = %fingerprint, "SUBMIT: Duplicate task suppressed");
        }
        Ok(outcome)
    }

    /// Re-queue a recovered task at its original priority with a fresh seq
    pub(crate) fn requeue(
        &self,
        task: Task,
        priority: i64,
        fingerprint: Fingerprint,
    ) -> Result<PushOutcome> {
        let is_process = task.is_process;
        self.tracked(Some(&fingerprint), |heap| {
            heap.push(TaskPayload::Task(task), priority, fingerprint.clone(), is_process)
        })
    }

    pub(crate) fn push_log(&self, record: LogRecord) -> Result<PushOutcome> {
        let fingerprint = record.fingerprint();
        self.tracked(None, |heap| heap.push_framework(TaskPayload::Log(Box::new(record)), fingerprint))
    }

    /// Push under the `proc` lock; an accepted application task is shelved
    /// as `queued` before the lock is released
    fn tracked(
        &self,
        shelve: Option<&Fingerprint>,
        push: impl FnOnce(&PriorityHeap) -> Result<PushOutcome>,
    ) -> Result<PushOutcome> {
        self.state.proc().with_lock(|proc| {
            let tracked = proc
                .get(proc_keys::TASK_ID_COUNTER)?
                .as_int()
                .unwrap_or_default();
            let tracked = u64::try_from(tracked).unwrap_or_default();
            let outcome = push(&self.heap)?;
            if let PushOutcome::Queued { seq, .. } = outcome {
                if seq != tracked {
                    error!(tracked, seq, heap = %self.heap.name(), "❌ SUBMIT: Task id counter out of step with heap");
                    return Err(OrchestraError::IdConflict { tracked, seq });
                }
                proc.set(proc_keys::TASK_ID_COUNTER, seq + 1)?;
                if let Some(fingerprint) = shelve {
                    proc.dict(proc_keys::SHELF)?
                        .set(fingerprint.as_str(), shelf_state::QUEUED)?;
                }
            }
            Ok(outcome)
        })
    }
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("heap", &self.heap.name())
            .field("max_queue_depth", &self.max_queue_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MprocConfig;
    use crate::error::ErrorKind;
    use crate::heap::HeapOptions;
    use crate::state::{InitInputs, SystemFacts};
    use std::sync::Barrier;

    fn setup(max_queue_depth: usize) -> (GlobalState, Submitter) {
        let heap_name = format!("submit-heap-{}", uuid::Uuid::new_v4().simple());
        let state = GlobalState::build(
            &format!("submit-{}", uuid::Uuid::new_v4().simple()),
            InitInputs {
                config: MprocConfig::default(),
                facts: SystemFacts::gather(),
                heap_name: heap_name.clone(),
                run_stamp: "unit".into(),
                pool_size: 1,
            },
        )
        .unwrap();
        let heap = PriorityHeap::create(&heap_name, HeapOptions::default()).unwrap();
        (state.clone(), Submitter::new(state, heap, max_queue_depth))
    }

    #[test]
    fn test_submit_tracks_ids_and_shelf() {
        let (state, submitter) = setup(10);
        let task = Task::new("job").arg(1);
        let fp = task.fingerprint();

        assert_eq!(
            submitter.submit(task.clone(), 5, None).unwrap(),
            PushOutcome::Queued { seq: 0, priority: 5 }
        );
        assert_eq!(submitter.submit(task, 5, None).unwrap(), PushOutcome::Duplicate);
        assert_eq!(state.proc().get(proc_keys::TASK_ID_COUNTER).unwrap().as_int(), Some(1));
        assert_eq!(state.counter(run_keys::TASKS_CREATED), 1);
        let shelf = state.proc().dict(proc_keys::SHELF).unwrap();
        assert_eq!(shelf.get(fp.as_str()).unwrap().as_str(), Some(shelf_state::QUEUED));
        submitter.heap().close();
        state.store().unlink().unwrap();
    }

    #[test]
    fn test_queue_depth_limit() {
        let (state, submitter) = setup(1);
        submitter.submit(Task::new("a"), 0, None).unwrap();
        let err = submitter.submit(Task::new("b"), 0, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PoolExhausted);
        assert!(!err.is_fatal());
        submitter.heap().close();
        state.store().unlink().unwrap();
    }

    #[test]
    fn test_concurrent_submits_of_one_fingerprint_queue_once() {
        let (state, submitter) = setup(100);
        let start = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let submitter = submitter.clone();
                let start = start.clone();
                std::thread::spawn(move || {
                    start.wait();
                    submitter.submit(Task::new("same").arg("payload"), 2, None).unwrap()
                })
            })
            .collect();
        let outcomes: Vec<PushOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let queued = outcomes
            .iter()
            .filter(|o| matches!(o, PushOutcome::Queued { .. }))
            .count();
        assert_eq!(queued, 1);
        assert_eq!(submitter.heap().len(), 1);
        assert_eq!(state.counter(run_keys::TASKS_CREATED), 1);
        assert_eq!(state.proc().get(proc_keys::TASK_ID_COUNTER).unwrap().as_int(), Some(1));
        submitter.heap().close();
        state.store().unlink().unwrap();
    }

    #[test]
    fn test_concurrent_submits_respect_queue_depth() {
        let (state, submitter) = setup(3);
        let start = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|n: i64| {
                let submitter = submitter.clone();
                let start = start.clone();
                std::thread::spawn(move || {
                    start.wait();
                    submitter.submit(Task::new("distinct").arg(n), 0, None)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::PoolExhausted))
            .count();
        assert_eq!(rejected, 5);
        assert_eq!(submitter.heap().application_len(), 3);
        submitter.heap().close();
        state.store().unlink().unwrap();
    }

    #[test]
    fn test_untracked_push_is_an_id_conflict() {
        let (state, submitter) = setup(10);
        // A push that bypasses the tracked path desynchronizes the counter
        let stray = Task::new("stray");
        let fp = stray.fingerprint();
        submitter
            .heap()
            .push(TaskPayload::Task(stray), 0, fp, true)
            .unwrap();

        let err = submitter.submit(Task::new("next"), 0, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IdConflict);
        assert!(err.is_fatal());
        submitter.heap().close();
        state.store().unlink().unwrap();
    }
}
