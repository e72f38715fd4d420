#![allow(clippy::doc_markdown)] // Allow technical terms like SQLite, WAL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # mproc core
//!
//! Process-level orchestration core: a shared state container with access
//! discipline, a priority task heap served by a supervised worker pool, and a
//! routed logging pipeline with console, text and SQLite sinks.
//!
//! ## Architecture
//!
//! One orchestrator owns the run. It builds a named [`shared::SharedStore`]
//! whose root holds six compartments (`conf`, `sys`, `run`, `proc`, `loc`,
//! `global`), creates the [`heap::PriorityHeap`], and starts workers. Workers
//! are booted with names only and attach to the store and heap themselves.
//! Application tasks flow through the heap by `(priority, seq)`; log records
//! produced in workers ride the same heap at a reserved priority and are
//! written by the orchestrator.
//!
//! ## Module Organization
//!
//! - [`shared`] - Guarded attributes, access modes, the shared dictionary and store
//! - [`heap`] - Priority heap with dedup, interrupt gating and sequence tracking
//! - [`log_router`] - Log levels, records, policy and sinks
//! - [`orchestrator`] - Lifecycle, scheduling, recovery and shutdown
//! - [`worker`] - Worker loop and task execution
//! - [`registry`] - Callable-id to handler resolution
//! - [`state`] - Compartment layout, host facts and localization
//! - [`config`] - YAML configuration with environment overlays
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mproc_core::config::MprocConfig;
//! use mproc_core::log_router::LogLevel;
//! use mproc_core::orchestrator::Orchestrator;
//! use mproc_core::registry::{handler_fn, HandlerRegistry, TaskOutput};
//! use mproc_core::task::Task;
//! use std::sync::Arc;
//!
//! # async fn example() -> mproc_core::error::Result<()> {
//! mproc_core::logging::init_structured_logging();
//!
//! let registry = HandlerRegistry::new();
//! registry.register("resize", handler_fn(|ctx, task| async move {
//!     ctx.log(LogLevel::Info, || format!("resizing {:?}", task.args)).await?;
//!     Ok(TaskOutput::new())
//! }));
//!
//! let orchestrator = Orchestrator::builder(MprocConfig::default())
//!     .registry(Arc::new(registry))
//!     .build()?;
//! orchestrator.submit(Task::new("resize").arg("a.png"), 10, None)?;
//! orchestrator.request_exit();
//! let report = orchestrator.run().await?;
//! println!("exit code {}", report.exit_code);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod heap;
pub mod log_router;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod shared;
pub mod state;
pub mod task;
pub mod trace;
pub mod worker;

pub use config::{ConfigManager, MprocConfig, SchedulerConfig};
pub use error::{ErrorKind, OrchestraError, Result};
pub use heap::{HeapEntry, PriorityHeap, PushOutcome};
pub use log_router::{LogLevel, LogRecord, LogRouter};
pub use orchestrator::{ExitReport, ExitSummary, Lifecycle, Orchestrator, OrchestratorBuilder};
pub use registry::{handler_fn, HandlerRegistry, TaskContext, TaskHandler, TaskOutput};
pub use shared::{AccessMode, GuardedAttribute, SharedDict, SharedStore, Value};
pub use state::GlobalState;
pub use task::{Fingerprint, Task};
pub use trace::TraceContext;
