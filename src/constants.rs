//! # System Constants
//!
//! Compartment names, reserved priorities, and well-known keys of the shared
//! state tree.

/// Priority reserved for log records. Lower numbers are served first.
pub const LOG_PRIORITY: i64 = -100;

/// Priority assigned to application submissions that do not name one.
pub const DEFAULT_PRIORITY: i64 = 0;

/// Slot id used in trace contexts produced by the orchestrator itself.
pub const ORCHESTRATOR_WID: u32 = 0;

/// Top-level compartments of the shared container.
pub mod compartments {
    pub const CONF: &str = "conf";
    pub const SYS: &str = "sys";
    pub const RUN: &str = "run";
    pub const PROC: &str = "proc";
    pub const LOC: &str = "loc";
    pub const GLOBAL: &str = "global";

    pub const ALL: [&str; 6] = [CONF, SYS, RUN, PROC, LOC, GLOBAL];
}

/// Keys of the `run` compartment.
pub mod run_keys {
    pub const INTERRUPT: &str = "mpy_interrupt";
    pub const EVENTS_TOTAL: &str = "events_total";
    pub const TASKS_CREATED: &str = "tasks_created";
    pub const TASKS_COMPLETED: &str = "tasks_completed";
    pub const TASKS_FAILED: &str = "tasks_failed";
    pub const TASKS_LOST: &str = "tasks_lost";
    pub const TASKS_DROPPED: &str = "tasks_dropped";
    pub const TASKS_DISCARDED: &str = "tasks_discarded";
    pub const COUNTERS: &str = "counters";
    pub const METRICS: &str = "metrics";

    /// Counter key for records emitted at `level`, e.g. `events_error`
    pub fn events_for(level: &str) -> String {
        format!("events_{level}")
    }
}

/// Keys of the `proc` compartment. The key set is fixed after init.
pub mod proc_keys {
    pub const POOL_SIZE: &str = "pool_size";
    pub const TASK_ID_COUNTER: &str = "task_id_counter";
    pub const TERMINATE: &str = "terminate";
    pub const HEAP_NAME: &str = "heap_name";
    pub const WORKERS: &str = "workers";
    pub const SHELF: &str = "shelf";
    pub const RETRIES: &str = "retries";
    pub const RUN_STAMP: &str = "run_stamp";
    pub const STARTED_AT: &str = "started_at";
}

/// Values written to `proc.shelf[fingerprint]`. Completed tasks are removed
/// from the shelf instead.
pub mod shelf_state {
    pub const QUEUED: &str = "queued";
    pub const IN_PROGRESS: &str = "in_progress";
    pub const FAILED: &str = "failed";
    pub const LOST: &str = "lost";
    pub const DROPPED: &str = "dropped";
}
