//! Shared fixtures for integration tests

use mproc_core::config::MprocConfig;
use mproc_core::registry::{handler_fn, HandlerRegistry, TaskOutput};
use mproc_core::shared::Value;
use mproc_core::state::{GlobalState, InitInputs, SystemFacts};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Unique name for stores and heaps so tests never collide
pub fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

/// Fast ticks, absolute pool size, short grace period
pub fn test_config(workers: usize) -> MprocConfig {
    let mut config = MprocConfig::default();
    config.max_workers_use_abs = true;
    config.max_workers_abs = workers;
    config.scheduler.tick_interval_ms = 5;
    config.scheduler.idle_poll_ms = 5;
    config.scheduler.shutdown_grace_ms = 2_000;
    config
}

/// Host facts with enough CPUs for the requested pool
pub fn facts_with_cpus(cpus: usize) -> SystemFacts {
    let mut facts = SystemFacts::gather();
    facts.logical_cpus = cpus;
    facts
}

pub fn build_state(config: MprocConfig) -> GlobalState {
    GlobalState::build(
        &unique("it-state"),
        InitInputs {
            config,
            facts: SystemFacts::gather(),
            heap_name: unique("it-heap"),
            run_stamp: "integration".to_string(),
            pool_size: 1,
        },
    )
    .expect("state builds")
}

/// Execution log shared between handlers and the test body
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn push(&self, label: impl Into<String>) {
        self.0.lock().push(label.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}

/// Handler that records its first argument
pub fn register_recorder(registry: &HandlerRegistry, callable: &str, recorder: &Recorder) {
    let recorder = recorder.clone();
    registry.register(
        callable,
        handler_fn(move |_ctx, task| {
            let recorder = recorder.clone();
            async move {
                let label = match task.args.first() {
                    Some(Value::Str(s)) => s.clone(),
                    Some(other) => format!("{other:?}"),
                    None => task.callable.clone(),
                };
                recorder.push(label);
                Ok(TaskOutput::new())
            }
        }),
    );
}

pub fn shared(registry: HandlerRegistry) -> Arc<HandlerRegistry> {
    Arc::new(registry)
}

/// Poll `check` until it holds or `limit` passes
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
