//! Re-queue or drop tasks whose executor went away.

use tracing::{debug, error, warn};

use crate::constants::{proc_keys, run_keys, shelf_state};
use crate::error::Result;
use crate::log_router::{LogLevel, LogRouter};
use crate::shared::Value;
use crate::state::GlobalState;
use crate::trace::TraceContext;
use crate::worker::Assignment;

use super::Submitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
    /// The shelf did not show the task as running; nothing to do
    Skipped,
    Requeued { seq: u64, attempt: i64 },
    Dropped { attempts: i64 },
}

pub(crate) struct RecoveryPolicy<'a> {
    pub(crate) state: &'a GlobalState,
    pub(crate) submitter: &'a Submitter,
    pub(crate) router: &'a LogRouter,
    pub(crate) trace: &'a TraceContext,
    pub(crate) max_retries: u32,
}

impl RecoveryPolicy<'_> {
    /// Handle a task that was held by `slot` when the slot died
    pub(crate) async fn recover(&self, slot: u32, assignment: Assignment, reason: &str) -> Result<Recovery> {
        let fingerprint = assignment.fingerprint.clone();
        let shelf = self.state.proc().dict(proc_keys::SHELF)?;
        let in_progress = shelf
            .get_opt(fingerprint.as_str())?
            .and_then(|v| v.as_str().map(|s| s == shelf_state::IN_PROGRESS))
            .unwrap_or(false);
        if !in_progress {
            debug!(slot, fingerprint = %fingerprint, "RECOVERY: Task not in progress, skipping");
            return Ok(Recovery::Skipped);
        }

        self.state.bump(run_keys::TASKS_LOST, 1)?;
        shelf.set(fingerprint.as_str(), shelf_state::LOST)?;
        let retries = self.state.proc().dict(proc_keys::RETRIES)?;
        let attempts = retries.increment(fingerprint.as_str(), 1)?;
        let trace = self.trace.rehydrate(self.trace.pid(), self.trace.wid(), Some(assignment.tid));

        if attempts > i64::from(self.max_retries) {
            shelf.set(fingerprint.as_str(), shelf_state::DROPPED)?;
            retries.pop(fingerprint.as_str(), Some(Value::Null))?;
            self.state.bump(run_keys::TASKS_DROPPED, 1)?;
            error!(
                slot,
                callable = %assignment.task.callable,
                attempts,
                reason = %reason,
                "❌ RECOVERY: Task dropped after repeated worker loss"
            );
            let message = self.state.render(
                "orchestrator",
                "task_dropped",
                &[
                    ("callable", assignment.task.callable.clone()),
                    ("retries", attempts.to_string()),
                ],
            );
            self.router.log(&trace, LogLevel::Critical, || message).await?;
            return Ok(Recovery::Dropped { attempts });
        }

        let message = self.state.render(
            "orchestrator",
            "worker_lost",
            &[("slot", slot.to_string()), ("task", assignment.tid.to_string())],
        );
        let outcome = self
            .submitter
            .requeue(assignment.task, assignment.priority, fingerprint.clone())?;
        let seq = outcome.seq().unwrap_or(assignment.tid);
        warn!(
            slot,
            fingerprint = %fingerprint,
            attempt = attempts,
            seq,
            reason = %reason,
            "🔁 RECOVERY: Lost task re-queued"
        );
        self.router.log(&trace, LogLevel::Warning, || message).await?;
        Ok(Recovery::Requeued { seq, attempt: attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MprocConfig;
    use crate::heap::{HeapOptions, PriorityHeap};
    use crate::orchestrator::ScriptedPrompt;
    use crate::state::{InitInputs, SystemFacts};
    use crate::task::Task;
    use std::sync::Arc;

    struct Fixture {
        state: GlobalState,
        submitter: Submitter,
        router: LogRouter,
        trace: TraceContext,
    }

    fn fixture() -> Fixture {
        let heap_name = format!("recovery-heap-{}", uuid::Uuid::new_v4().simple());
        let config = MprocConfig::default();
        let state = GlobalState::build(
            &format!("recovery-{}", uuid::Uuid::new_v4().simple()),
            InitInputs {
                config: config.clone(),
                facts: SystemFacts::gather(),
                heap_name: heap_name.clone(),
                run_stamp: "unit".into(),
                pool_size: 1,
            },
        )
        .unwrap();
        let heap = PriorityHeap::create(&heap_name, HeapOptions::default()).unwrap();
        Fixture {
            submitter: Submitter::new(state.clone(), heap, 100),
            router: LogRouter::with_config(state.clone(), &config, Arc::new(ScriptedPrompt::default())),
            trace: TraceContext::root("orchestrator", "run", 8),
            state,
        }
    }

    fn running(fx: &Fixture, task: Task) -> Assignment {
        let outcome = fx.submitter.submit(task.clone(), 3, None).unwrap();
        let entry = fx.submitter.heap().try_pop().unwrap().unwrap();
        assert_eq!(Some(entry.seq), outcome.seq());
        fx.state
            .proc()
            .dict(proc_keys::SHELF)
            .unwrap()
            .set(entry.fingerprint.as_str(), shelf_state::IN_PROGRESS)
            .unwrap();
        Assignment {
            tid: entry.seq,
            priority: entry.priority,
            fingerprint: entry.fingerprint,
            task,
        }
    }

    #[tokio::test]
    async fn test_requeue_then_drop() {
        let fx = fixture();
        let policy = RecoveryPolicy {
            state: &fx.state,
            submitter: &fx.submitter,
            router: &fx.router,
            trace: &fx.trace,
            max_retries: 1,
        };

        let first = running(&fx, Task::new("flaky"));
        let recovered = policy.recover(1, first, "panicked").await.unwrap();
        assert_eq!(recovered, Recovery::Requeued { seq: 1, attempt: 1 });
        let again = fx.submitter.heap().try_pop().unwrap().unwrap();
        assert_eq!(again.priority, 3);

        fx.state
            .proc()
            .dict(proc_keys::SHELF)
            .unwrap()
            .set(again.fingerprint.as_str(), shelf_state::IN_PROGRESS)
            .unwrap();
        let second = Assignment {
            tid: again.seq,
            priority: again.priority,
            fingerprint: again.fingerprint.clone(),
            task: Task::new("flaky"),
        };
        let dropped = policy.recover(1, second, "panicked").await.unwrap();
        assert_eq!(dropped, Recovery::Dropped { attempts: 2 });
        assert!(fx.submitter.heap().is_empty());
        assert_eq!(fx.state.counter(run_keys::TASKS_LOST), 2);
        assert_eq!(fx.state.counter(run_keys::TASKS_DROPPED), 1);
        assert_eq!(fx.state.counter(&run_keys::events_for("critical")), 1);
        assert_eq!(fx.state.counter(&run_keys::events_for("warning")), 1);
        let retries = fx.state.proc().dict(proc_keys::RETRIES).unwrap();
        assert!(!retries.contains(again.fingerprint.as_str()).unwrap());

        fx.submitter.heap().close();
        fx.state.store().unlink().unwrap();
    }

    #[tokio::test]
    async fn test_finished_task_is_not_recovered() {
        let fx = fixture();
        let policy = RecoveryPolicy {
            state: &fx.state,
            submitter: &fx.submitter,
            router: &fx.router,
            trace: &fx.trace,
            max_retries: 3,
        };
        let work = running(&fx, Task::new("quick"));
        // A completed task has already left the shelf
        fx.state
            .proc()
            .dict(proc_keys::SHELF)
            .unwrap()
            .delete(work.fingerprint.as_str())
            .unwrap();
        assert_eq!(policy.recover(2, work, "killed").await.unwrap(), Recovery::Skipped);
        assert_eq!(fx.state.counter(run_keys::TASKS_LOST), 0);
        fx.submitter.heap().close();
        fx.state.store().unlink().unwrap();
    }
}
