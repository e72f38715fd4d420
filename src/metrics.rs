//! # Task Metrics
//!
//! Outer wrapper around task dispatch. When enabled it keeps
//! `run.metrics.<callable>` up to date with call count, failures, and total
//! and worst duration in microseconds. Perf mode additionally emits a debug
//! record per task.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Instant;
use tracing::debug;

use crate::config::MprocConfig;
use crate::constants::run_keys;
use crate::error::{OrchestraError, Result};
use crate::log_router::{LogLevel, LogRouter};
use crate::shared::Value;
use crate::state::GlobalState;
use crate::trace::TraceContext;

#[derive(Debug, Clone)]
pub struct TaskMetrics {
    state: GlobalState,
    enabled: bool,
    perf_mode: bool,
}

impl TaskMetrics {
    pub fn new(state: GlobalState, config: &MprocConfig) -> Self {
        Self {
            state,
            enabled: config.metrics_enable,
            perf_mode: config.metrics_enable && config.metrics_perf_mode,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Await `body`, recording its duration and outcome for `callable`
    pub async fn measure<T, E, F>(
        &self,
        callable: &str,
        trace: &TraceContext,
        router: &LogRouter,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
    {
        if !self.enabled {
            return body.await;
        }

        let started = Instant::now();
        let result = body.await;
        let elapsed_us = i64::try_from(started.elapsed().as_micros()).unwrap_or(i64::MAX);

        if let Err(err) = self.record(callable, elapsed_us, result.is_err()) {
            debug!(callable = %callable, error = %err, "METRICS: Could not record task metrics");
        }
        if self.perf_mode {
            let outcome = router
                .log(trace, LogLevel::Debug, || {
                    format!("{callable} took {elapsed_us}us")
                })
                .await;
            if let Err(err) = outcome {
                debug!(callable = %callable, error = %err, "METRICS: Perf record not routed");
            }
        }
        result
    }

    fn record(&self, callable: &str, elapsed_us: i64, failed: bool) -> Result<()> {
        let run = self.state.run();
        run.with_lock(|run| {
            let metrics = run.dict(run_keys::METRICS)?;
            let fresh: BTreeMap<String, Value> = ["calls", "failures", "total_us", "max_us"]
                .into_iter()
                .map(|key| (key.to_string(), Value::Int(0)))
                .collect();
            let entry = match metrics.setdefault(callable, Value::Map(fresh))? {
                Value::Dict(entry) => entry,
                other => {
                    return Err(OrchestraError::KeyType(format!(
                        "run.metrics.{callable} holds a {}",
                        other.type_name()
                    )))
                }
            };
            entry.increment("calls", 1)?;
            if failed {
                entry.increment("failures", 1)?;
            }
            entry.increment("total_us", elapsed_us)?;
            let worst = entry.get("max_us")?.as_int().unwrap_or(0);
            if elapsed_us > worst {
                entry.set("max_us", elapsed_us)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ScriptedPrompt;
    use crate::state::{InitInputs, SystemFacts};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_measure_records_calls_and_failures() {
        let mut config = MprocConfig::default();
        config.metrics_enable = true;
        let state = GlobalState::build(
            &format!("metrics-{}", uuid::Uuid::new_v4().simple()),
            InitInputs {
                config: config.clone(),
                facts: SystemFacts::gather(),
                heap_name: "metrics-heap-unused".into(),
                run_stamp: "unit".into(),
                pool_size: 1,
            },
        )
        .unwrap();
        let router = LogRouter::with_config(state.clone(), &config, Arc::new(ScriptedPrompt::default()));
        let metrics = TaskMetrics::new(state.clone(), &config);
        let trace = TraceContext::root("test", "metrics", 4);

        let ok: std::result::Result<u8, String> =
            metrics.measure("resize", &trace, &router, async { Ok(1) }).await;
        assert_eq!(ok, Ok(1));
        let err: std::result::Result<u8, String> = metrics
            .measure("resize", &trace, &router, async { Err("boom".to_string()) })
            .await;
        assert!(err.is_err());

        let entry = state.run().dict(run_keys::METRICS).unwrap().dict("resize").unwrap();
        assert_eq!(entry.get("calls").unwrap(), Value::Int(2));
        assert_eq!(entry.get("failures").unwrap(), Value::Int(1));
        assert!(entry.get("max_us").unwrap().as_int().unwrap() <= entry.get("total_us").unwrap().as_int().unwrap());
        state.store().unlink().unwrap();
    }
}
