//! # Tasks
//!
//! A task names a registered callable and carries its arguments. Callables
//! never cross a spawn boundary; workers resolve the id against their
//! [`HandlerRegistry`](crate::registry::HandlerRegistry).

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::log_router::LogRecord;
use crate::shared::Value;

/// Content hash used for duplicate suppression
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Caller-supplied fingerprint
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// SHA-256 hex digest of the canonical JSON of `parts`
    pub fn of<T: Serialize + ?Sized>(parts: &T) -> Self {
        let canonical = serde_json::to_vec(parts).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub callable: String,
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
    /// `true` runs on a worker, `false` runs inside the orchestrator
    pub is_process: bool,
}

impl Task {
    pub fn new(callable: impl Into<String>) -> Self {
        Self {
            callable: callable.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            is_process: true,
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn local(mut self) -> Self {
        self.is_process = false;
        self
    }

    /// Content fingerprint over `(callable, args, kwargs)`. Nested container
    /// handles hash by their current contents.
    pub fn fingerprint(&self) -> Fingerprint {
        let args = self.args.iter().map(Value::to_plain).collect::<Vec<_>>();
        let kwargs = self
            .kwargs
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_plain()))
            .collect::<BTreeMap<_, _>>();
        Fingerprint::of(&(&self.callable, args, kwargs))
    }
}

/// What a heap entry carries
#[derive(Debug, Clone)]
pub enum TaskPayload {
    Task(Task),
    Log(Box<LogRecord>),
}

impl TaskPayload {
    pub fn is_log(&self) -> bool {
        matches!(self, TaskPayload::Log(_))
    }

    pub fn label(&self) -> &str {
        match self {
            TaskPayload::Task(task) => &task.callable,
            TaskPayload::Log(_) => "log",
        }
    }
}
