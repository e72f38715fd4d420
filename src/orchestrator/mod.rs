//! # Orchestrator
//!
//! Owns the run: builds the shared state, creates the priority heap, starts
//! and supervises the worker pool, drains framework (log) entries in-process,
//! and shuts everything down in order.
//!
//! ## Tick
//!
//! ```text
//! read interrupt flag
//! drain framework entries (and local tasks unless paused)
//! operator quit / abort?        -> discard queued application entries
//! harvest reports, reap dead slots, recover held tasks, respawn
//! drain again, then assign process tasks to idle slots (unless paused or aborting)
//! exit requested and queue empty?  -> start the grace clock
//! every slot idle, or grace over?  -> shutdown
//! wait for a push, a report or the tick interval
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use mproc_core::config::MprocConfig;
//! use mproc_core::orchestrator::Orchestrator;
//! use mproc_core::registry::{handler_fn, HandlerRegistry, TaskOutput};
//! use mproc_core::task::Task;
//! use std::sync::Arc;
//!
//! # async fn example() -> mproc_core::error::Result<()> {
//! let registry = HandlerRegistry::new();
//! registry.register("greet", handler_fn(|ctx, task| async move {
//!     let _ = (ctx, task);
//!     Ok(TaskOutput::new())
//! }));
//!
//! let orchestrator = Orchestrator::builder(MprocConfig::default())
//!     .registry(Arc::new(registry))
//!     .build()?;
//! orchestrator.submit(Task::new("greet").arg("world"), 0, None)?;
//! orchestrator.request_exit();
//! let report = orchestrator.run().await?;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

mod interrupt;
mod pool;
mod recovery;
mod submit;
mod summary;

pub use interrupt::{OperatorPrompt, ScriptedPrompt, StdinPrompt};
pub use submit::Submitter;
pub use summary::{ExitReport, ExitSummary, TaskTally};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::AbortHandle;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::config::MprocConfig;
use crate::constants::{proc_keys, run_keys, shelf_state, ORCHESTRATOR_WID};
use crate::error::{ErrorKind, OrchestraError, Result};
use crate::heap::{HeapOptions, InterruptGate, PriorityHeap, PushOutcome};
use crate::log_router::{sinks, LogLevel, LogRecord, LogRouter};
use crate::metrics::TaskMetrics;
use crate::registry::HandlerRegistry;
use crate::shared::Value;
use crate::state::{GlobalState, InitInputs, SystemFacts};
use crate::task::{Fingerprint, Task, TaskPayload};
use crate::trace::TraceContext;
use crate::worker::{Executor, TaskOutcome, WorkerReport};
use pool::{InFlight, SlotExit, WorkerPool};
use recovery::RecoveryPolicy;

/// Lifecycle of an orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    config: MprocConfig,
    registry: Arc<HandlerRegistry>,
    prompt: Arc<dyn OperatorPrompt>,
    store_name: Option<String>,
    facts: Option<SystemFacts>,
}

impl OrchestratorBuilder {
    pub fn registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Where operator answers come from during an interrupt
    pub fn prompt(mut self, prompt: Arc<dyn OperatorPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Name of the shared store; a unique name is generated otherwise
    pub fn store_name(mut self, name: impl Into<String>) -> Self {
        self.store_name = Some(name.into());
        self
    }

    /// Host facts to record instead of gathering them
    pub fn facts(mut self, facts: SystemFacts) -> Self {
        self.facts = Some(facts);
        self
    }

    /// Build the orchestrator. A failure prints a final critical record to
    /// the console before the error is returned.
    #[instrument(skip(self))]
    pub fn build(self) -> Result<Orchestrator> {
        let max_depth = self.config.scheduler.max_trace_depth;
        Orchestrator::init(self).map_err(|err| {
            error!(error = %err, "❌ ORCHESTRATOR: Initialization failed");
            let record = init_failure_record(&err, max_depth);
            if let Err(io) = sinks::print_line(&record.render_console()) {
                warn!(error = %io, "ORCHESTRATOR: Init failure record not printed");
            }
            err
        })
    }
}

/// Console record for a run that never started
fn init_failure_record(err: &OrchestraError, max_depth: usize) -> LogRecord {
    let trace = TraceContext::root("orchestrator", "init", max_depth);
    LogRecord::new(&trace, LogLevel::Critical, err.to_string())
}

/// Control flags that can be flipped while the loop runs
#[derive(Debug, Default)]
struct Controls {
    exit: AtomicBool,
    abort: AtomicBool,
}

/// State owned by the running loop
struct RunState {
    pool: WorkerPool,
    pending: VecDeque<WorkerReport>,
    started_at: DateTime<Utc>,
    /// Set once exit is requested with nothing left queued
    exit_deadline: Option<tokio::time::Instant>,
    report: Option<ExitReport>,
}

enum Tick {
    Continue { progressed: bool },
    Shutdown,
}

pub struct Orchestrator {
    config: MprocConfig,
    state: GlobalState,
    heap: Arc<PriorityHeap>,
    router: Arc<LogRouter>,
    submitter: Submitter,
    executor: Executor,
    trace: TraceContext,
    pool_size: usize,
    controls: Controls,
    lifecycle: Mutex<Lifecycle>,
    aborts: Arc<DashMap<u32, AbortHandle>>,
    runtime: tokio::sync::Mutex<RunState>,
}

impl Orchestrator {
    pub fn builder(config: MprocConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            registry: Arc::new(HandlerRegistry::new()),
            prompt: Arc::new(StdinPrompt),
            store_name: None,
            facts: None,
        }
    }

    fn init(builder: OrchestratorBuilder) -> Result<Self> {
        let OrchestratorBuilder {
            config,
            registry,
            prompt,
            store_name,
            facts,
        } = builder;

        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let store_name = store_name.unwrap_or_else(|| format!("mproc-{run_id}"));
        let heap_name = format!("{store_name}-heap");
        let run_stamp = format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &run_id[..8]);
        let facts = facts.unwrap_or_else(SystemFacts::gather);
        let pool_size = config.pool_size(facts.logical_cpus);

        let state = GlobalState::build(
            &store_name,
            InitInputs {
                config: config.clone(),
                facts,
                heap_name: heap_name.clone(),
                run_stamp,
                pool_size,
            },
        )?;

        let heap = match PriorityHeap::create(
            &heap_name,
            HeapOptions {
                autocorrect: config.scheduler.autocorrect_priority,
            },
        ) {
            Ok(heap) => heap,
            Err(err) => {
                state.store().unlink().ok();
                return Err(OrchestraError::init("priority heap", err));
            }
        };
        heap.install_gate(InterruptGate::new(
            state.run().clone(),
            Duration::from_millis(config.scheduler.interrupt_backoff_min_ms),
            Duration::from_millis(config.scheduler.interrupt_backoff_max_ms),
        ));

        let router = Arc::new(LogRouter::with_config(state.clone(), &config, prompt));
        let submitter = Submitter::new(state.clone(), heap.clone(), config.scheduler.max_queue_depth);
        let trace = TraceContext::root("orchestrator", "run", config.scheduler.max_trace_depth);
        let executor = Executor::new(
            state.clone(),
            router.clone(),
            submitter.clone(),
            registry.clone(),
            TaskMetrics::new(state.clone(), &config),
            trace.clone(),
        );
        let pool = WorkerPool::new(&store_name, registry);

        info!(
            store = %store_name,
            heap = %heap_name,
            pool_size,
            mp_enable = config.mp_enable,
            "🚀 ORCHESTRATOR: Initialized"
        );

        Ok(Self {
            aborts: pool.aborts(),
            runtime: tokio::sync::Mutex::new(RunState {
                pool,
                pending: VecDeque::new(),
                started_at: Utc::now(),
                exit_deadline: None,
                report: None,
            }),
            config,
            state,
            heap,
            router,
            submitter,
            executor,
            trace,
            pool_size,
            controls: Controls::default(),
            lifecycle: Mutex::new(Lifecycle::Created),
        })
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    pub fn config(&self) -> &MprocConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<LogRouter> {
        &self.router
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    fn set_lifecycle(&self, next: Lifecycle) {
        let mut lifecycle = self.lifecycle.lock();
        debug!(from = ?*lifecycle, to = ?next, "ORCHESTRATOR: Lifecycle transition");
        *lifecycle = next;
    }

    /// Queue an application task. Rejected once shutdown has begun.
    pub fn submit(
        &self,
        task: Task,
        priority: i64,
        fingerprint: Option<Fingerprint>,
    ) -> Result<PushOutcome> {
        match self.lifecycle() {
            Lifecycle::ShuttingDown | Lifecycle::Stopped => {
                Err(OrchestraError::HeapClosed(self.heap.name().to_string()))
            }
            Lifecycle::Created | Lifecycle::Running => self.submitter.submit(task, priority, fingerprint),
        }
    }

    /// Finish queued work, then shut down
    pub fn request_exit(&self) {
        info!("🏁 ORCHESTRATOR: Exit requested");
        self.controls.exit.store(true, Ordering::Release);
    }

    /// Stop assigning, discard queued application work, then shut down
    pub fn request_abort(&self) {
        warn!("🛑 ORCHESTRATOR: Abort requested");
        self.controls.abort.store(true, Ordering::Release);
    }

    pub fn request_interrupt(&self) -> Result<()> {
        self.state.set_interrupt(true)
    }

    pub fn clear_interrupt(&self) -> Result<()> {
        self.state.set_interrupt(false)
    }

    /// Abort the worker in `slot`. Its task goes through recovery.
    pub fn kill_worker(&self, slot: u32) -> bool {
        match self.aborts.get(&slot) {
            Some(handle) => {
                warn!(slot, "🔪 ORCHESTRATOR: Killing worker");
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Drive the run until shutdown. Calling it again after shutdown returns
    /// the same report.
    #[instrument(skip(self), fields(store = %self.state.store().name()))]
    pub async fn run(&self) -> Result<ExitReport> {
        let mut rs = self.runtime.lock().await;
        if let Some(report) = rs.report.clone() {
            return Ok(report);
        }

        self.set_lifecycle(Lifecycle::Running);
        rs.started_at = Utc::now();
        if let Err(err) = self.start_pool(&mut rs) {
            error!(error = %err, "❌ ORCHESTRATOR: Worker pool did not start, forcing shutdown");
            let report = self.shutdown(&mut rs, true).await?;
            rs.report = Some(report.clone());
            return Ok(report);
        }
        info!(workers = if self.config.mp_enable { self.pool_size } else { 0 }, "▶️ ORCHESTRATOR: Running");

        let tick = Duration::from_millis(self.config.scheduler.tick_interval_ms.max(1));
        let forced = loop {
            match self.tick(&mut rs).await {
                Ok(Tick::Shutdown) => break false,
                Ok(Tick::Continue { progressed: true }) => tokio::task::yield_now().await,
                Ok(Tick::Continue { progressed: false }) => self.wait(&mut rs, tick).await,
                Err(err) if err.is_fatal() || err.kind() == ErrorKind::WorkerLost => {
                    error!(error = %err, "❌ ORCHESTRATOR: Fatal error, forcing shutdown");
                    break true;
                }
                Err(err) => {
                    error!(error = %err, "⚠️ ORCHESTRATOR: Tick failed, continuing");
                    self.wait(&mut rs, tick).await;
                }
            }
        };

        let report = self.shutdown(&mut rs, forced).await?;
        rs.report = Some(report.clone());
        Ok(report)
    }

    fn start_pool(&self, rs: &mut RunState) -> Result<()> {
        if !self.config.mp_enable {
            return Ok(());
        }
        for slot in 1..=self.pool_size as u32 {
            rs.pool.spawn(slot)?;
            rs.pool.publish(&self.state, slot)?;
        }
        Ok(())
    }

    async fn tick(&self, rs: &mut RunState) -> Result<Tick> {
        let mut progressed = self.drain().await?;

        if self.router.take_quit_request() {
            self.request_abort();
        }
        let aborting = self.controls.abort.load(Ordering::Acquire);
        if aborting {
            self.discard_application()?;
        }

        progressed |= self.harvest(rs).await?;
        // Records pushed by a finished task land before its slot gets new work
        progressed |= self.drain().await?;
        if !aborting && !self.heap.paused() {
            progressed |= self.assign(rs)?;
        }

        let exiting = aborting || self.controls.exit.load(Ordering::Acquire);
        if exiting && self.heap.application_len() == 0 {
            let now = tokio::time::Instant::now();
            let deadline = *rs.exit_deadline.get_or_insert_with(|| {
                debug!(grace_ms = self.config.scheduler.shutdown_grace_ms, "ORCHESTRATOR: Grace period started");
                now + self.grace()
            });
            if (rs.pool.all_idle() && rs.pending.is_empty()) || now >= deadline {
                return Ok(Tick::Shutdown);
            }
        }
        Ok(Tick::Continue { progressed })
    }

    fn grace(&self) -> Duration {
        Duration::from_millis(self.config.scheduler.shutdown_grace_ms)
    }

    async fn wait(&self, rs: &mut RunState, tick: Duration) {
        let report = tokio::select! {
            _ = self.heap.pushed() => None,
            report = rs.pool.next_report() => report,
            _ = tokio::time::sleep(tick) => None,
        };
        if let Some(report) = report {
            rs.pending.push_back(report);
        }
    }

    /// Drain framework entries from the head of the heap. Local tasks and,
    /// without a worker pool, every task run inline unless the run is
    /// paused or aborting.
    async fn drain(&self) -> Result<bool> {
        let mut progressed = false;
        loop {
            if self.router.take_quit_request() {
                self.request_abort();
            }
            let runnable = !self.heap.paused() && !self.controls.abort.load(Ordering::Acquire);
            let inline_all = !self.config.mp_enable;
            let Some(entry) = self.heap.pop_if(|e| {
                e.payload.is_log() || (runnable && (!e.is_process || inline_all))
            })?
            else {
                break;
            };
            progressed = true;

            if let TaskPayload::Log(record) = &entry.payload {
                self.router.emit(record).await?;
            } else if let Some(work) = InFlight::from_entry(entry) {
                self.run_inline(work).await?;
            }
        }
        Ok(progressed)
    }

    async fn run_inline(&self, work: InFlight) -> Result<()> {
        let fingerprint = work.assignment.fingerprint.clone();
        self.shelve(&fingerprint, shelf_state::IN_PROGRESS)?;
        debug!(tid = work.assignment.tid, callable = %work.assignment.task.callable, "ORCHESTRATOR: Running task inline");

        let outcome = AssertUnwindSafe(self.executor.execute(ORCHESTRATOR_WID, &work.assignment))
            .catch_unwind()
            .await;
        match outcome {
            Ok(outcome) => self.settle(&fingerprint, &outcome),
            Err(_) => {
                self.recovery()
                    .recover(ORCHESTRATOR_WID, work.assignment, "inline task panicked")
                    .await?;
                Ok(())
            }
        }
    }

    fn discard_application(&self) -> Result<()> {
        let discarded = self.heap.discard_application();
        if discarded.is_empty() {
            return Ok(());
        }
        let shelf = self.state.proc().dict(proc_keys::SHELF)?;
        for entry in &discarded {
            shelf.pop(entry.fingerprint.as_str(), Some(Value::Null))?;
        }
        self.state.bump(run_keys::TASKS_DISCARDED, discarded.len() as i64)?;
        warn!(discarded = discarded.len(), "🗑️ ORCHESTRATOR: Queued application tasks discarded");
        Ok(())
    }

    /// Apply worker reports, then reap dead slots
    async fn harvest(&self, rs: &mut RunState) -> Result<bool> {
        let mut progressed = false;
        while let Some(report) = rs.pending.pop_front().or_else(|| rs.pool.try_report()) {
            progressed = true;
            self.on_report(rs, report)?;
        }

        for (slot, exit) in rs.pool.reap() {
            progressed = true;
            let reason = match &exit {
                SlotExit::Returned => "worker returned".to_string(),
                SlotExit::Killed => "worker killed".to_string(),
                SlotExit::Failed(msg) => format!("worker failed: {msg}"),
                SlotExit::Panicked(msg) => format!("worker panicked: {msg}"),
            };
            warn!(slot, reason = %reason, "ORCHESTRATOR: Worker exited");

            let held = rs.pool.slot_mut(slot).and_then(|record| record.current.take());
            let task_id = held.as_ref().map(|work| work.assignment.tid);
            if let Some(work) = held {
                self.recovery().recover(slot, work.assignment, &reason).await?;
            }

            match exit {
                SlotExit::Panicked(_) | SlotExit::Killed => {
                    info!(slot, "♻️ ORCHESTRATOR: Respawning worker");
                    rs.pool.spawn(slot)?;
                    rs.pool.publish(&self.state, slot)?;
                }
                SlotExit::Returned | SlotExit::Failed(_) => {
                    rs.pool.publish(&self.state, slot)?;
                    if rs.pool.alive() == 0 {
                        return Err(OrchestraError::WorkerLost { slot, task_id });
                    }
                }
            }
        }
        Ok(progressed)
    }

    fn on_report(&self, rs: &mut RunState, report: WorkerReport) -> Result<()> {
        match report {
            WorkerReport::Ready { slot, pid } => {
                if let Some(record) = rs.pool.slot_mut(slot) {
                    record.pid = Some(pid);
                }
                rs.pool.publish(&self.state, slot)
            }
            WorkerReport::Finished {
                slot,
                tid,
                fingerprint,
                outcome,
            } => {
                if let Some(record) = rs.pool.slot_mut(slot) {
                    match record.current.as_ref() {
                        Some(work) if work.assignment.tid == tid => record.current = None,
                        other => warn!(
                            slot,
                            tid,
                            held = ?other.map(|w| w.assignment.tid),
                            "ORCHESTRATOR: Report for a task the slot does not hold"
                        ),
                    }
                }
                self.settle(&fingerprint, &outcome)?;
                rs.pool.publish(&self.state, slot)
            }
        }
    }

    /// Hand queued process tasks to idle slots
    fn assign(&self, rs: &mut RunState) -> Result<bool> {
        if !self.config.mp_enable {
            return Ok(false);
        }
        let mut progressed = false;
        for slot in rs.pool.idle_slots() {
            let Some(entry) = self.heap.pop_if(|e| e.is_process && !e.payload.is_log())? else {
                break;
            };
            let Some(work) = InFlight::from_entry(entry) else {
                continue;
            };
            let fingerprint = work.assignment.fingerprint.clone();
            self.shelve(&fingerprint, shelf_state::IN_PROGRESS)?;

            match rs.pool.assign(slot, work) {
                Ok(()) => {
                    progressed = true;
                    rs.pool.publish(&self.state, slot)?;
                }
                Err(work) => {
                    debug!(slot, "ORCHESTRATOR: Slot refused assignment, re-queueing");
                    let assignment = work.assignment;
                    self.submitter
                        .requeue(assignment.task, assignment.priority, fingerprint)?;
                }
            }
        }
        Ok(progressed)
    }

    fn shelve(&self, fingerprint: &Fingerprint, status: &str) -> Result<()> {
        self.state
            .proc()
            .with_lock(|proc| proc.dict(proc_keys::SHELF)?.set(fingerprint.as_str(), status))
    }

    /// Completed tasks leave `shelf` and `retries`; failures stay on the
    /// shelf as `failed`
    fn settle(&self, fingerprint: &Fingerprint, outcome: &TaskOutcome) -> Result<()> {
        match outcome {
            TaskOutcome::Completed => self.state.proc().with_lock(|proc| {
                proc.dict(proc_keys::SHELF)?
                    .pop(fingerprint.as_str(), Some(Value::Null))?;
                proc.dict(proc_keys::RETRIES)?
                    .pop(fingerprint.as_str(), Some(Value::Null))?;
                Ok(())
            }),
            TaskOutcome::Failed(_) => self.shelve(fingerprint, shelf_state::FAILED),
        }
    }

    fn recovery(&self) -> RecoveryPolicy<'_> {
        RecoveryPolicy {
            state: &self.state,
            submitter: &self.submitter,
            router: &self.router,
            trace: &self.trace,
            max_retries: self.config.scheduler.max_task_retries,
        }
    }

    /// Ordered shutdown. Workers get whatever is left of the grace period to
    /// finish; the store is unlinked last.
    async fn shutdown(&self, rs: &mut RunState, forced: bool) -> Result<ExitReport> {
        self.set_lifecycle(Lifecycle::ShuttingDown);
        info!(forced, "🛑 ORCHESTRATOR: Shutting down");
        if let Err(err) = self.state.proc().set(proc_keys::TERMINATE, true) {
            warn!(error = %err, "ORCHESTRATOR: Could not publish terminate flag");
        }

        rs.pool.close_inboxes();
        let deadline = rs
            .exit_deadline
            .unwrap_or_else(|| tokio::time::Instant::now() + self.grace());
        let stragglers = rs.pool.join_until(deadline).await;
        let mut forced = forced;
        if stragglers > 0 {
            let err = OrchestraError::ShutdownTimeout {
                grace_ms: self.config.scheduler.shutdown_grace_ms,
                remaining: stragglers,
            };
            warn!(error = %err, "⏱️ ORCHESTRATOR: Grace period expired");
            forced = true;
        }

        while let Some(report) = rs.pending.pop_front().or_else(|| rs.pool.try_report()) {
            if let Err(err) = self.on_report(rs, report) {
                warn!(error = %err, "ORCHESTRATOR: Late report not applied");
            }
        }
        for (slot, work) in rs.pool.take_held() {
            self.shelve(&work.assignment.fingerprint, shelf_state::LOST).ok();
            self.state.bump(run_keys::TASKS_LOST, 1).ok();
            warn!(slot, tid = work.assignment.tid, "ORCHESTRATOR: Task lost at shutdown");
        }

        // Framework entries still queued are written; anything else is left over
        let mut discarded = 0_i64;
        for entry in self.heap.close() {
            match entry.payload {
                TaskPayload::Log(record) => {
                    if let Err(err) = self.router.emit(&record).await {
                        warn!(error = %err, "ORCHESTRATOR: Queued record not written");
                    }
                }
                TaskPayload::Task(_) => discarded += 1,
            }
        }
        if discarded > 0 {
            self.state.bump(run_keys::TASKS_DISCARDED, discarded).ok();
        }

        let summary = ExitSummary::collect(&self.state, rs.started_at);
        self.emit_summary(&summary).await;
        self.router.close().await;
        if let Err(err) = self.state.store().unlink() {
            warn!(error = %err, "ORCHESTRATOR: Store unlink failed");
        }

        self.set_lifecycle(Lifecycle::Stopped);
        let report = ExitReport::new(forced, summary);
        info!(
            exit_code = report.exit_code,
            duration_ms = report.summary.duration_ms,
            events_total = report.summary.events_total,
            "✅ ORCHESTRATOR: Stopped"
        );
        Ok(report)
    }

    async fn emit_summary(&self, summary: &ExitSummary) {
        let message = self.state.render(
            "orchestrator",
            "exit_summary",
            &[
                ("duration", format!("{}ms", summary.duration_ms)),
                ("total", summary.events_total.to_string()),
                ("levels", summary.levels_line()),
            ],
        );
        if let Err(err) = self.router.log(&self.trace, LogLevel::Exit, || message).await {
            warn!(error = %err, "ORCHESTRATOR: Exit summary not written");
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("store", &self.state.store().name())
            .field("heap", &self.heap.name())
            .field("pool_size", &self.pool_size)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
