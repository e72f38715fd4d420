//! # Worker
//!
//! A worker is booted with nothing but names and channels. It attaches to the
//! shared state by store name, rebuilds its own router and submitter, then
//! executes assignments until its inbox closes or it observes `terminate`
//! while idle.
//!
//! Each worker runs on its own thread with a current-thread runtime.
//!
//! Handler errors are task failures: they are logged at `error` and the loop
//! continues. A panic ends the worker; the orchestrator sees it when it reaps
//! the slot and recovers the task.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::constants::run_keys;
use crate::error::Result;
use crate::log_router::{LogLevel, LogRouter};
use crate::metrics::TaskMetrics;
use crate::orchestrator::{StdinPrompt, Submitter};
use crate::registry::{HandlerRegistry, TaskContext, TaskOutput};
use crate::state::GlobalState;
use crate::task::{Fingerprint, Task};
use crate::trace::TraceContext;

/// One task handed to a slot
#[derive(Debug, Clone)]
pub struct Assignment {
    pub tid: u64,
    pub priority: i64,
    pub fingerprint: Fingerprint,
    pub task: Task,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
}

#[derive(Debug)]
pub enum WorkerReport {
    Ready { slot: u32, pid: u32 },
    Finished {
        slot: u32,
        tid: u64,
        fingerprint: Fingerprint,
        outcome: TaskOutcome,
    },
}

/// Everything a worker receives at spawn
pub struct WorkerBoot {
    pub store_name: String,
    pub slot: u32,
    pub registry: Arc<HandlerRegistry>,
    pub inbox: mpsc::Receiver<Assignment>,
    pub reports: mpsc::UnboundedSender<WorkerReport>,
}

/// Runs tasks against attached state; shared by workers and inline dispatch
#[derive(Clone)]
pub(crate) struct Executor {
    state: GlobalState,
    router: Arc<LogRouter>,
    submitter: Submitter,
    registry: Arc<HandlerRegistry>,
    metrics: TaskMetrics,
    root: TraceContext,
}

impl Executor {
    pub(crate) fn new(
        state: GlobalState,
        router: Arc<LogRouter>,
        submitter: Submitter,
        registry: Arc<HandlerRegistry>,
        metrics: TaskMetrics,
        root: TraceContext,
    ) -> Self {
        Self {
            state,
            router,
            submitter,
            registry,
            metrics,
            root,
        }
    }

    pub(crate) async fn execute(&self, wid: u32, assignment: &Assignment) -> TaskOutcome {
        let callable = assignment.task.callable.clone();
        let trace = match self.root.enter("task", &callable) {
            Ok(trace) => trace.rehydrate(std::process::id(), wid, Some(assignment.tid)),
            Err(err) => return self.fail(&self.root, &callable, err.to_string()).await,
        };

        let handler = match self.registry.resolve(&callable) {
            Ok(handler) => handler,
            Err(err) => return self.fail(&trace, &callable, err.to_string()).await,
        };

        let ctx = TaskContext::new(
            trace.clone(),
            self.state.clone(),
            self.router.clone(),
            self.submitter.clone(),
        );
        let result = self
            .metrics
            .measure(
                &callable,
                &trace,
                &self.router,
                handler.call(ctx, assignment.task.clone()),
            )
            .await;

        match result {
            Ok(output) => match self.accumulate(output) {
                Ok(()) => TaskOutcome::Completed,
                Err(err) => self.fail(&trace, &callable, err.to_string()).await,
            },
            Err(err) => self.fail(&trace, &callable, err.to_string()).await,
        }
    }

    /// Integer outputs add into `run.counters`
    fn accumulate(&self, output: TaskOutput) -> Result<()> {
        let run = self.state.run();
        run.with_lock(|run| {
            let counters = run.dict(run_keys::COUNTERS)?;
            for (key, value) in output {
                if let Some(n) = value.as_int() {
                    counters.increment(key, n)?;
                }
            }
            run.increment(run_keys::TASKS_COMPLETED, 1)?;
            Ok(())
        })
    }

    async fn fail(&self, trace: &TraceContext, callable: &str, reason: String) -> TaskOutcome {
        if let Err(err) = self.state.bump(run_keys::TASKS_FAILED, 1) {
            debug!(error = %err, "WORKER: Failure counter unavailable");
        }
        let message = self.state.render(
            "worker",
            "task_failed",
            &[("callable", callable.to_string()), ("reason", reason.clone())],
        );
        if let Err(err) = self.router.log(trace, LogLevel::Error, || message).await {
            warn!(callable = %callable, error = %err, "WORKER: Failure record not routed");
        }
        TaskOutcome::Failed(reason)
    }
}

/// Worker main loop
#[instrument(skip(boot), fields(slot = boot.slot))]
pub async fn run_worker(boot: WorkerBoot) -> Result<()> {
    let WorkerBoot {
        store_name,
        slot,
        registry,
        mut inbox,
        reports,
    } = boot;

    let state = GlobalState::attach(&store_name)?;
    let config = state.config()?;
    let router = Arc::new(LogRouter::with_config(
        state.clone(),
        &config,
        Arc::new(StdinPrompt),
    ));
    let submitter = Submitter::attach(&state)?;
    let metrics = TaskMetrics::new(state.clone(), &config);
    let pid = std::process::id();
    let root = TraceContext::root("worker", "run", config.scheduler.max_trace_depth)
        .rehydrate(pid, slot, None);
    let executor = Executor::new(state.clone(), router, submitter, registry, metrics, root);
    let idle_poll = Duration::from_millis(config.scheduler.idle_poll_ms.max(1));

    if reports.send(WorkerReport::Ready { slot, pid }).is_err() {
        return Ok(());
    }
    info!(slot, pid, "👷 WORKER: Ready");

    loop {
        match tokio::time::timeout(idle_poll, inbox.recv()).await {
            Ok(Some(assignment)) => {
                debug!(slot, tid = assignment.tid, callable = %assignment.task.callable, "WORKER: Executing task");
                let outcome = executor.execute(slot, &assignment).await;
                let report = WorkerReport::Finished {
                    slot,
                    tid: assignment.tid,
                    fingerprint: assignment.fingerprint,
                    outcome,
                };
                if reports.send(report).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(_) => {
                if state.terminate_set() && inbox.is_empty() {
                    break;
                }
            }
        }
    }

    info!(slot, "👷 WORKER: Exiting");
    Ok(())
}
