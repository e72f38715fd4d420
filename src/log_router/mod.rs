//! # Log Router
//!
//! Builds structured records and multiplexes them to the console, a text
//! file and an embedded SQL table.
//!
//! ## Dispatch
//!
//! ```text
//! log(trace, level, producer)
//!   ├── trace already dispatching?          -> LogRecursion
//!   ├── no sink takes this level?           -> Suppressed (producer never runs)
//!   ├── record = producer() + trace identity
//!   ├── heap alive and caller is a worker?  -> push at -100, orchestrator drains
//!   └── otherwise                           -> emit now
//! ```
//!
//! Emission bumps `run.events_total` and `run.events_<level>` and, for
//! interrupt-class levels, pauses the run until the operator answers.

mod level;
mod policy;
mod record;
pub mod sinks;

pub use level::LogLevel;
pub use policy::LogPolicy;
pub use record::LogRecord;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::MprocConfig;
use crate::constants::{proc_keys, run_keys};
use crate::error::{OrchestraError, Result};
use crate::heap::{PriorityHeap, PushOutcome};
use crate::orchestrator::{OperatorPrompt, Submitter};
use crate::state::GlobalState;
use crate::trace::TraceContext;
use sinks::{print_line, ConsoleSink, LogSink, SqlSink, TextFileSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    /// No sink takes the level; the message was never built
    Suppressed,
    /// Handed to the orchestrator through the heap
    Queued,
    /// An identical record is already queued
    Duplicate,
    /// Written to the sinks by this call
    Emitted,
}

struct SinkSlot {
    sink: Box<dyn LogSink>,
    persistent: bool,
    disabled: AtomicBool,
}

pub struct LogRouter {
    state: GlobalState,
    policy: LogPolicy,
    sinks: Vec<SinkSlot>,
    prompt: Arc<dyn OperatorPrompt>,
    submitter: Mutex<Option<Submitter>>,
    max_queue_depth: usize,
    failure_marked: AtomicBool,
    quit_requested: AtomicBool,
    closed: AtomicBool,
}

impl LogRouter {
    /// Router configured from the `conf` compartment
    pub fn new(state: GlobalState, prompt: Arc<dyn OperatorPrompt>) -> Result<Self> {
        let config = state.config()?;
        Ok(Self::with_config(state, &config, prompt))
    }

    pub fn with_config(
        state: GlobalState,
        config: &MprocConfig,
        prompt: Arc<dyn OperatorPrompt>,
    ) -> Self {
        let run_stamp = state
            .proc_str(proc_keys::RUN_STAMP)
            .unwrap_or_else(|_| "unstamped".to_string());

        let mut sinks = Vec::new();
        if config.log_to_console {
            sinks.push(SinkSlot {
                sink: Box::new(ConsoleSink),
                persistent: false,
                disabled: AtomicBool::new(false),
            });
        }
        if config.log_enable && config.log_text_enable {
            sinks.push(SinkSlot {
                sink: Box::new(TextFileSink::new(config.resolved_log_text_path(&run_stamp))),
                persistent: true,
                disabled: AtomicBool::new(false),
            });
        }
        if config.log_enable && config.log_sql_enable {
            sinks.push(SinkSlot {
                sink: Box::new(SqlSink::new(config.resolved_log_sql_path(), &run_stamp)),
                persistent: true,
                disabled: AtomicBool::new(false),
            });
        }

        Self {
            state,
            policy: LogPolicy::from_config(config),
            sinks,
            prompt,
            submitter: Mutex::new(None),
            max_queue_depth: config.scheduler.max_queue_depth,
            failure_marked: AtomicBool::new(false),
            quit_requested: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &LogPolicy {
        &self.policy
    }

    /// Route one record. `producer` is evaluated at most once, and only when
    /// at least one sink would take the record.
    pub async fn log<F>(&self, trace: &TraceContext, level: LogLevel, producer: F) -> Result<LogOutcome>
    where
        F: FnOnce() -> String + Send,
    {
        if trace.is_dispatching() {
            return Err(OrchestraError::LogRecursion(trace.chain()));
        }
        if self.policy.suppressed_everywhere(trace, level) {
            return Ok(LogOutcome::Suppressed);
        }

        let dispatch = trace.dispatching_clone();
        let mut record = LogRecord::new(&dispatch, level, producer());
        record.persist = self.policy.persists(trace, level);
        record.print = self.policy.prints(trace, level);

        if !trace.is_orchestrator() {
            if let Some(submitter) = self.live_submitter() {
                return match submitter.push_log(record.clone()) {
                    Ok(PushOutcome::Queued { .. }) => Ok(LogOutcome::Queued),
                    Ok(PushOutcome::Duplicate) => Ok(LogOutcome::Duplicate),
                    Err(OrchestraError::HeapClosed(_)) => {
                        self.emit(&record).await?;
                        Ok(LogOutcome::Emitted)
                    }
                    Err(err) => Err(err),
                };
            }
        }

        self.emit(&record).await?;
        Ok(LogOutcome::Emitted)
    }

    fn live_submitter(&self) -> Option<Submitter> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let mut cached = self.submitter.lock();
        if let Some(submitter) = cached.as_ref() {
            if submitter.heap().is_alive() {
                return Some(submitter.clone());
            }
            *cached = None;
        }
        let heap_name = self.state.proc_str(proc_keys::HEAP_NAME).ok()?;
        let heap = PriorityHeap::attach(&heap_name).ok()?;
        let submitter = Submitter::new(self.state.clone(), heap, self.max_queue_depth);
        *cached = Some(submitter.clone());
        Some(submitter)
    }

    /// Write a built record to every sink that takes it
    pub async fn emit(&self, record: &LogRecord) -> Result<()> {
        let mut printed = false;
        for slot in &self.sinks {
            let wanted = if slot.persistent { record.persist } else { record.print };
            if !wanted || slot.disabled.load(Ordering::Acquire) {
                continue;
            }
            match slot.sink.write(record).await {
                Ok(()) => printed |= !slot.persistent,
                Err(err) => {
                    slot.disabled.store(true, Ordering::Release);
                    self.mark_sink_failure(slot.sink.name(), &err);
                    if !printed {
                        print_line(&record.render_console())?;
                        printed = true;
                    }
                }
            }
        }

        if let Err(err) = self.count(record.level) {
            debug!(error = %err, "LOG: Event counters unavailable");
        }

        if record.interrupt_enable && self.policy.interrupts(record.level) {
            self.interrupt(record.level).await?;
        }
        Ok(())
    }

    fn count(&self, level: LogLevel) -> Result<()> {
        let run = self.state.run();
        run.with_lock(|run| {
            run.increment(run_keys::EVENTS_TOTAL, 1)?;
            run.increment(&run_keys::events_for(level.as_str()), 1)?;
            Ok(())
        })
    }

    fn mark_sink_failure(&self, sink: &str, err: &OrchestraError) {
        warn!(sink = %sink, error = %err, "⚠️ LOG: Sink disabled after failure");
        if self.failure_marked.swap(true, Ordering::AcqRel) {
            return;
        }
        let marker = self.state.render(
            "log",
            "sink_failure",
            &[("sink", sink.to_string()), ("reason", err.to_string())],
        );
        if let Err(io) = print_line(&marker) {
            warn!(error = %io, "LOG: Could not print sink failure marker");
        }
    }

    /// Set the interrupt flag, wait for the operator, clear the flag
    async fn interrupt(&self, level: LogLevel) -> Result<()> {
        self.state.set_interrupt(true)?;
        let yes = self.state.text("orchestrator", "yes_quit");
        let question = self.state.render(
            "orchestrator",
            "interrupt_prompt",
            &[("level", level.to_string()), ("yes", yes.clone())],
        );

        let answer = self.prompt.ask(&question).await;
        self.state.set_interrupt(false)?;

        match answer {
            Ok(answer) if answer.trim().eq_ignore_ascii_case(yes.trim()) => {
                warn!(level = %level, "🛑 LOG: Operator requested shutdown");
                self.quit_requested.store(true, Ordering::Release);
            }
            Ok(_) => debug!(level = %level, "LOG: Operator resumed the run"),
            Err(err) => warn!(error = %err, "LOG: Operator prompt failed, resuming"),
        }
        Ok(())
    }

    /// True once after the operator answered the quit token
    pub fn take_quit_request(&self) -> bool {
        self.quit_requested.swap(false, Ordering::AcqRel)
    }

    /// Stop routing through the heap and release sink resources
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.submitter.lock().take();
        for slot in &self.sinks {
            if let Err(err) = slot.sink.close().await {
                warn!(sink = %slot.sink.name(), error = %err, "LOG: Sink close failed");
            }
        }
        debug!("LOG: Router closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for LogRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogRouter")
            .field("sinks", &self.sinks.iter().map(|s| s.sink.name()).collect::<Vec<_>>())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::orchestrator::ScriptedPrompt;
    use crate::state::{InitInputs, SystemFacts};
    use std::sync::atomic::AtomicUsize;

    fn state_with(config: MprocConfig) -> GlobalState {
        GlobalState::build(
            &format!("router-{}", uuid::Uuid::new_v4().simple()),
            InitInputs {
                config,
                facts: SystemFacts::gather(),
                heap_name: format!("router-heap-{}", uuid::Uuid::new_v4().simple()),
                run_stamp: "unit".to_string(),
                pool_size: 1,
            },
        )
        .unwrap()
    }

    fn router(config: MprocConfig, answers: &[&str]) -> (GlobalState, LogRouter) {
        let state = state_with(config.clone());
        let prompt = Arc::new(ScriptedPrompt::new(answers.iter().copied()));
        let router = LogRouter::with_config(state.clone(), &config, prompt);
        (state, router)
    }

    #[tokio::test]
    async fn test_fully_suppressed_level_never_builds_message() {
        let mut config = MprocConfig::default();
        config.no_log_levels.insert(LogLevel::Debug);
        config.no_print_levels.insert(LogLevel::Debug);
        let (state, router) = router(config, &[]);
        let calls = AtomicUsize::new(0);

        let trace = TraceContext::root("test", "suppressed", 4);
        let outcome = router
            .log(&trace, LogLevel::Debug, || {
                calls.fetch_add(1, Ordering::SeqCst);
                "expensive".to_string()
            })
            .await
            .unwrap();

        assert_eq!(outcome, LogOutcome::Suppressed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.counter(run_keys::EVENTS_TOTAL), 0);
        state.store().unlink().unwrap();
    }

    #[tokio::test]
    async fn test_dispatching_trace_is_recursion() {
        let (state, router) = router(MprocConfig::default(), &[]);
        let trace = TraceContext::root("test", "recursion", 4).dispatching_clone();
        let err = router
            .log(&trace, LogLevel::Info, || "loop".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LogRecursion);
        assert!(err.is_fatal());
        state.store().unlink().unwrap();
    }

    #[tokio::test]
    async fn test_orchestrator_records_emit_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MprocConfig::default();
        config.project_root = dir.path().to_path_buf();
        config.log_text_enable = true;
        let (state, router) = router(config.clone(), &[]);

        let trace = TraceContext::root("test", "emit", 4);
        let outcome = router
            .log(&trace, LogLevel::Warning, || "disk nearly full".to_string())
            .await
            .unwrap();
        assert_eq!(outcome, LogOutcome::Emitted);
        assert_eq!(state.counter(run_keys::EVENTS_TOTAL), 1);
        assert_eq!(state.counter(&run_keys::events_for("warning")), 1);

        let text = tokio::fs::read_to_string(config.resolved_log_text_path("unit"))
            .await
            .unwrap();
        assert!(text.starts_with("WARNING - "));
        assert!(text.contains("\tdisk nearly full\n"));
        state.store().unlink().unwrap();
    }

    #[tokio::test]
    async fn test_worker_records_queue_at_framework_priority() {
        let (state, router) = router(MprocConfig::default(), &[]);
        let heap_name = state.proc_str(proc_keys::HEAP_NAME).unwrap();
        let heap = PriorityHeap::create(&heap_name, Default::default()).unwrap();

        let trace = TraceContext::root("test", "queue", 4).rehydrate(std::process::id(), 1, Some(0));
        let outcome = router
            .log(&trace, LogLevel::Info, || "from a worker".to_string())
            .await
            .unwrap();
        assert_eq!(outcome, LogOutcome::Queued);

        let entry = heap.try_pop().unwrap().unwrap();
        assert_eq!(entry.priority, crate::constants::LOG_PRIORITY);
        assert!(!entry.is_process);
        // Counted when drained, not when queued
        assert_eq!(state.counter(run_keys::EVENTS_TOTAL), 0);

        heap.close();
        let outcome = router
            .log(&trace, LogLevel::Info, || "heap gone".to_string())
            .await
            .unwrap();
        assert_eq!(outcome, LogOutcome::Emitted);
        state.store().unlink().unwrap();
    }

    #[tokio::test]
    async fn test_interrupt_level_prompts_and_clears() {
        let mut config = MprocConfig::default();
        config.interrupt_levels.insert(LogLevel::Critical);
        let (state, router) = router(config, &["no", " Y "]);
        let trace = TraceContext::root("test", "interrupt", 4);

        router.log(&trace, LogLevel::Critical, || "first".into()).await.unwrap();
        assert!(!state.interrupt_set());
        assert!(!router.take_quit_request());

        router.log(&trace, LogLevel::Critical, || "second".into()).await.unwrap();
        assert!(!state.interrupt_set());
        assert!(router.take_quit_request());
        assert!(!router.take_quit_request());
        state.store().unlink().unwrap();
    }

    #[tokio::test]
    async fn test_failing_sink_falls_back_to_console() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the log file should be makes every append fail
        let blocked = dir.path().join("blocked.txt");
        std::fs::create_dir_all(&blocked).unwrap();

        let mut config = MprocConfig::default();
        config.log_text_enable = true;
        config.log_text_path = Some(blocked);
        let (state, router) = router(config, &[]);
        let trace = TraceContext::root("test", "fallback", 4);

        router.log(&trace, LogLevel::Error, || "one".into()).await.unwrap();
        router.log(&trace, LogLevel::Error, || "two".into()).await.unwrap();
        assert!(router.sinks.iter().any(|s| s.disabled.load(Ordering::Acquire)));
        assert!(router.failure_marked.load(Ordering::Acquire));
        assert_eq!(state.counter(run_keys::EVENTS_TOTAL), 2);
        state.store().unlink().unwrap();
    }
}
