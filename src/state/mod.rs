//! # Global State
//!
//! The six compartments of the shared container and the init sequence that
//! builds them. The orchestrator calls [`GlobalState::build`]; workers call
//! [`GlobalState::attach`] with the store name they were booted with.
//!
//! | compartment | contents                           | access after init |
//! |-------------|------------------------------------|-------------------|
//! | `conf`      | configuration                      | locked            |
//! | `sys`       | host facts                         | locked            |
//! | `run`       | counters, interrupt flag           | open              |
//! | `proc`      | worker table, heap name, id counter | tightened        |
//! | `loc`       | localized strings                  | locked            |
//! | `global`    | application scratch                | open              |

pub mod localization;
pub mod system;

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::MprocConfig;
use crate::constants::{compartments, proc_keys, run_keys};
use crate::error::{OrchestraError, Result};
use crate::log_router::LogLevel;
use crate::shared::{AccessMode, SharedDict, SharedStore, Value};

pub use system::SystemFacts;

/// Inputs of the init sequence that are resolved before the store exists
#[derive(Debug, Clone)]
pub struct InitInputs {
    pub config: MprocConfig,
    pub facts: SystemFacts,
    pub heap_name: String,
    pub run_stamp: String,
    pub pool_size: usize,
}

#[derive(Debug, Clone)]
pub struct GlobalState {
    store: SharedStore,
    conf: SharedDict,
    sys: SharedDict,
    run: SharedDict,
    proc: SharedDict,
    loc: SharedDict,
    global: SharedDict,
}

fn empty() -> Value {
    Value::Map(BTreeMap::new())
}

impl GlobalState {
    /// Run the init sequence: resolve `conf`, `sys` and `loc`, open the
    /// store, add `run` and `proc`, then fix access modes and seal them.
    pub fn build(store_name: &str, inputs: InitInputs) -> Result<Self> {
        inputs
            .config
            .validate()
            .map_err(|e| OrchestraError::init("configuration", e))?;
        if inputs.config.require_elevated && !inputs.facts.elevated {
            return Err(OrchestraError::init(
                "privileges",
                "require_elevated is set but the process is not elevated",
            ));
        }
        let conf = Value::from(
            serde_json::to_value(&inputs.config)
                .map_err(|e| OrchestraError::init("configuration", e))?,
        );
        let sys = inputs.facts.to_value();
        let loc = Value::Map(localization::table(&inputs.config.language)?);

        let store = SharedStore::create(store_name)?;
        let state = match Self::populate(store.clone(), conf, sys, loc, &inputs) {
            Ok(state) => state,
            Err(err) => {
                store.unlink().ok();
                return Err(err);
            }
        };

        info!(
            store = %store_name,
            pool_size = inputs.pool_size,
            language = %inputs.config.language,
            "🏗️ STATE: Shared state initialized"
        );
        Ok(state)
    }

    fn populate(
        store: SharedStore,
        conf: Value,
        sys: Value,
        loc: Value,
        inputs: &InitInputs,
    ) -> Result<Self> {
        let root = store.root()?;
        root.set(compartments::CONF, conf)?;
        root.set(compartments::SYS, sys)?;
        root.set(compartments::LOC, loc)?;

        let mut run = BTreeMap::new();
        for key in [
            run_keys::EVENTS_TOTAL,
            run_keys::TASKS_CREATED,
            run_keys::TASKS_COMPLETED,
            run_keys::TASKS_FAILED,
            run_keys::TASKS_LOST,
            run_keys::TASKS_DROPPED,
            run_keys::TASKS_DISCARDED,
        ] {
            run.insert(key.to_string(), Value::Int(0));
        }
        for level in LogLevel::ALL {
            run.insert(run_keys::events_for(level.as_str()), Value::Int(0));
        }
        run.insert(run_keys::INTERRUPT.to_string(), Value::Bool(false));
        run.insert(run_keys::COUNTERS.to_string(), empty());
        run.insert(run_keys::METRICS.to_string(), empty());
        root.set(compartments::RUN, Value::Map(run))?;

        let proc = BTreeMap::from([
            (proc_keys::POOL_SIZE.to_string(), Value::from(inputs.pool_size)),
            (proc_keys::TASK_ID_COUNTER.to_string(), Value::Int(0)),
            (proc_keys::TERMINATE.to_string(), Value::Bool(false)),
            (proc_keys::HEAP_NAME.to_string(), Value::from(inputs.heap_name.clone())),
            (proc_keys::WORKERS.to_string(), empty()),
            (proc_keys::SHELF.to_string(), empty()),
            (proc_keys::RETRIES.to_string(), empty()),
            (proc_keys::RUN_STAMP.to_string(), Value::from(inputs.run_stamp.clone())),
            (proc_keys::STARTED_AT.to_string(), Value::from(Utc::now().to_rfc3339())),
        ]);
        root.set(compartments::PROC, Value::Map(proc))?;
        root.set(compartments::GLOBAL, empty())?;

        let state = Self::from_store(store)?;
        state.conf.set_access_deep(AccessMode::Locked)?;
        state.sys.set_access_deep(AccessMode::Locked)?;
        state.loc.set_access_deep(AccessMode::Locked)?;
        state.proc.set_access(AccessMode::Tightened)?;
        root.set_access(AccessMode::Tightened)?;
        state.store.seal_access();
        Ok(state)
    }

    /// Rebuild every handle from the store name
    pub fn attach(store_name: &str) -> Result<Self> {
        let state = Self::from_store(SharedStore::attach(store_name)?)?;
        debug!(store = %store_name, "STATE: Attached to shared state");
        Ok(state)
    }

    fn from_store(store: SharedStore) -> Result<Self> {
        Ok(Self {
            conf: store.compartment(compartments::CONF)?,
            sys: store.compartment(compartments::SYS)?,
            run: store.compartment(compartments::RUN)?,
            proc: store.compartment(compartments::PROC)?,
            loc: store.compartment(compartments::LOC)?,
            global: store.compartment(compartments::GLOBAL)?,
            store,
        })
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn conf(&self) -> &SharedDict {
        &self.conf
    }

    pub fn sys(&self) -> &SharedDict {
        &self.sys
    }

    pub fn run(&self) -> &SharedDict {
        &self.run
    }

    pub fn proc(&self) -> &SharedDict {
        &self.proc
    }

    pub fn loc(&self) -> &SharedDict {
        &self.loc
    }

    pub fn global(&self) -> &SharedDict {
        &self.global
    }

    /// Typed view of the `conf` compartment
    pub fn config(&self) -> Result<MprocConfig> {
        let plain = self.conf.snapshot()?;
        serde_json::from_value(plain.to_json())
            .map_err(|e| OrchestraError::init("configuration snapshot", e))
    }

    /// Localized text for `subsystem.key`; falls back to the key path
    pub fn text(&self, subsystem: &str, key: &str) -> String {
        self.loc
            .dict(subsystem)
            .and_then(|section| section.get(key))
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{subsystem}.{key}"))
    }

    pub fn render(&self, subsystem: &str, key: &str, args: &[(&str, String)]) -> String {
        localization::render(&self.text(subsystem, key), args)
    }

    pub fn interrupt_set(&self) -> bool {
        self.run
            .get_opt(run_keys::INTERRUPT)
            .ok()
            .flatten()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn set_interrupt(&self, on: bool) -> Result<()> {
        self.run.set(run_keys::INTERRUPT, on)
    }

    pub fn terminate_set(&self) -> bool {
        self.proc
            .get_opt(proc_keys::TERMINATE)
            .ok()
            .flatten()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn proc_str(&self, key: &str) -> Result<String> {
        match self.proc.get(key)? {
            Value::Str(s) => Ok(s),
            other => Err(OrchestraError::KeyType(format!(
                "proc.{key} holds a {} instead of a string",
                other.type_name()
            ))),
        }
    }

    pub fn bump(&self, key: &str, delta: i64) -> Result<i64> {
        self.run.increment(key, delta)
    }

    pub fn counter(&self, key: &str) -> i64 {
        self.run
            .get_opt(key)
            .ok()
            .flatten()
            .and_then(|v| v.as_int())
            .unwrap_or(0)
    }
}
