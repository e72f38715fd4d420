use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::constants::run_keys;
use crate::log_router::LogLevel;
use crate::state::GlobalState;

/// Task counters of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskTally {
    pub created: i64,
    pub completed: i64,
    pub failed: i64,
    pub lost: i64,
    pub dropped: i64,
    pub discarded: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    /// Emitted records per level name
    pub events: BTreeMap<String, i64>,
    pub events_total: i64,
    pub tasks: TaskTally,
    /// Integer outputs accumulated from task return maps
    pub counters: BTreeMap<String, i64>,
}

impl ExitSummary {
    /// Read the run counters. The exit record itself is not included.
    pub(crate) fn collect(state: &GlobalState, started_at: DateTime<Utc>) -> Self {
        let finished_at = Utc::now();
        let events = LogLevel::ALL
            .iter()
            .map(|level| {
                let key = run_keys::events_for(level.as_str());
                (level.as_str().to_string(), state.counter(&key))
            })
            .collect();

        let counters = state
            .run()
            .dict(run_keys::COUNTERS)
            .and_then(|dict| dict.items())
            .map(|items| {
                items
                    .into_iter()
                    .filter_map(|(key, value)| value.as_int().map(|n| (key, n)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            events,
            events_total: state.counter(run_keys::EVENTS_TOTAL),
            tasks: TaskTally {
                created: state.counter(run_keys::TASKS_CREATED),
                completed: state.counter(run_keys::TASKS_COMPLETED),
                failed: state.counter(run_keys::TASKS_FAILED),
                lost: state.counter(run_keys::TASKS_LOST),
                dropped: state.counter(run_keys::TASKS_DROPPED),
                discarded: state.counter(run_keys::TASKS_DISCARDED),
            },
            counters,
        }
    }

    pub fn events_at(&self, level: LogLevel) -> i64 {
        self.events.get(level.as_str()).copied().unwrap_or(0)
    }

    /// `level=count` pairs for every level that saw at least one record
    pub fn levels_line(&self) -> String {
        let parts: Vec<_> = self
            .events
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(level, count)| format!("{level}={count}"))
            .collect();
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitReport {
    /// 0 on clean shutdown, 1 when workers had to be force-terminated or a
    /// fatal error ended the run
    pub exit_code: i32,
    pub forced: bool,
    pub summary: ExitSummary,
}

impl ExitReport {
    pub fn new(forced: bool, summary: ExitSummary) -> Self {
        Self {
            exit_code: i32::from(forced),
            forced,
            summary,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.exit_code == 0
    }
}
