//! # Configuration System
//!
//! Typed configuration for the orchestration core, loaded from YAML with
//! environment-specific overrides (see [`loader::ConfigManager`]).
//!
//! The top-level fields are the framework's configuration surface: language,
//! privilege requirement, logging sinks and level policies, metrics switches,
//! worker pool sizing, and paths. Scheduler tuning lives in
//! [`SchedulerConfig`].
//!
//! ```rust
//! use mproc_core::config::MprocConfig;
//!
//! let config = MprocConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.pool_size(8), 4);
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::log_router::LogLevel;
use crate::state::localization::SUPPORTED_LANGUAGES;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring mproc-config.yaml
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MprocConfig {
    /// Identifier of the localization table
    pub language: String,
    /// Refuse to start unless running with elevated privileges
    pub require_elevated: bool,

    pub log_enable: bool,
    pub log_sql_enable: bool,
    pub log_text_enable: bool,
    pub log_to_console: bool,
    /// Levels that are never persisted
    pub no_log_levels: BTreeSet<LogLevel>,
    /// Levels that never reach stdout
    pub no_print_levels: BTreeSet<LogLevel>,
    /// Levels that raise a process-wide interrupt after emission
    pub interrupt_levels: BTreeSet<LogLevel>,

    pub metrics_enable: bool,
    pub metrics_perf_mode: bool,

    /// Run application tasks in worker processes; when false they run inline
    pub mp_enable: bool,
    pub max_workers_abs: usize,
    pub max_workers_rel: f64,
    pub max_workers_use_abs: bool,
    /// Round the relative pool size down (true) or up (false)
    pub max_workers_rel_floor: bool,

    pub project_root: PathBuf,
    pub log_dir: PathBuf,
    pub log_sql_path: Option<PathBuf>,
    pub log_text_path: Option<PathBuf>,
    pub main_db_path: Option<PathBuf>,

    pub scheduler: SchedulerConfig,
}

/// Scheduler, recovery, and shutdown tuning
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Normalize negative application priorities to 0
    pub autocorrect_priority: bool,
    pub max_queue_depth: usize,
    pub max_task_retries: u32,
    pub tick_interval_ms: u64,
    pub idle_poll_ms: u64,
    pub shutdown_grace_ms: u64,
    pub max_trace_depth: usize,
    pub interrupt_backoff_min_ms: u64,
    pub interrupt_backoff_max_ms: u64,
}

impl Default for MprocConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            require_elevated: false,
            log_enable: true,
            log_sql_enable: false,
            log_text_enable: false,
            log_to_console: true,
            no_log_levels: BTreeSet::new(),
            no_print_levels: BTreeSet::from([LogLevel::Debug]),
            interrupt_levels: BTreeSet::new(),
            metrics_enable: false,
            metrics_perf_mode: false,
            mp_enable: true,
            max_workers_abs: 4,
            max_workers_rel: 0.5,
            max_workers_use_abs: false,
            max_workers_rel_floor: true,
            project_root: PathBuf::from("."),
            log_dir: PathBuf::from("log"),
            log_sql_path: None,
            log_text_path: None,
            main_db_path: None,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            autocorrect_priority: true,
            max_queue_depth: 10_000,
            max_task_retries: 2,
            tick_interval_ms: 20,
            idle_poll_ms: 50,
            shutdown_grace_ms: 5_000,
            max_trace_depth: 64,
            interrupt_backoff_min_ms: 5,
            interrupt_backoff_max_ms: 250,
        }
    }
}

impl MprocConfig {
    /// Validate values that serde cannot check on its own
    pub fn validate(&self) -> ConfigResult<()> {
        if self.language.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "language",
                "",
                "language identifier must not be empty",
            ));
        }
        let language = self.language.trim().to_ascii_lowercase();
        if !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
            return Err(ConfigurationError::UnknownLanguage {
                language: self.language.clone(),
                supported: SUPPORTED_LANGUAGES.iter().map(|l| l.to_string()).collect(),
            });
        }
        if let Some(level) = self
            .interrupt_levels
            .iter()
            .find(|level| self.no_log_levels.contains(level) && self.no_print_levels.contains(level))
        {
            return Err(ConfigurationError::SilentInterruptLevel(*level));
        }
        if self.max_workers_abs == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_workers_abs",
                "0",
                "absolute worker count must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.max_workers_rel) || self.max_workers_rel.is_nan() {
            return Err(ConfigurationError::invalid_value(
                "max_workers_rel",
                self.max_workers_rel.to_string(),
                "relative worker count must lie in [0, 1]",
            ));
        }
        if self.scheduler.max_trace_depth == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_trace_depth",
                "0",
                "trace depth limit must be at least 1",
            ));
        }
        if self.scheduler.interrupt_backoff_min_ms > self.scheduler.interrupt_backoff_max_ms {
            return Err(ConfigurationError::invalid_value(
                "scheduler.interrupt_backoff_min_ms",
                self.scheduler.interrupt_backoff_min_ms.to_string(),
                "minimum backoff exceeds maximum backoff",
            ));
        }
        Ok(())
    }

    /// Compute the worker pool size for a host with `logical_cpus` CPUs.
    ///
    /// The result is clamped to `[1, logical_cpus]`; it is computed once at
    /// init and cached in the `proc` compartment.
    pub fn pool_size(&self, logical_cpus: usize) -> usize {
        let cpus = logical_cpus.max(1);
        let requested = if self.max_workers_use_abs {
            self.max_workers_abs
        } else {
            let raw = self.max_workers_rel * cpus as f64;
            if self.max_workers_rel_floor {
                raw.floor() as usize
            } else {
                raw.ceil() as usize
            }
        };
        requested.clamp(1, cpus)
    }

    /// Resolve a path against `project_root` unless it is already absolute
    pub fn resolve_path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn resolved_log_dir(&self) -> PathBuf {
        self.resolve_path(&self.log_dir)
    }

    /// Text log file for a run; defaults to `<log_dir>/log_<stamp>.txt`
    pub fn resolved_log_text_path(&self, run_stamp: &str) -> PathBuf {
        match &self.log_text_path {
            Some(path) => self.resolve_path(path),
            None => self.resolved_log_dir().join(format!("log_{run_stamp}.txt")),
        }
    }

    pub fn resolved_log_sql_path(&self) -> PathBuf {
        match &self.log_sql_path {
            Some(path) => self.resolve_path(path),
            None => self.resolved_log_dir().join("log.sqlite"),
        }
    }

    pub fn resolved_main_db_path(&self) -> Option<PathBuf> {
        self.main_db_path.as_ref().map(|p| self.resolve_path(p))
    }
}
