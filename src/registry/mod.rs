//! # Handler Registry
//!
//! Tasks name their callable by id; the registry resolves ids to handlers on
//! whichever side executes the task. Handlers receive a [`TaskContext`]
//! carrying the rehydrated trace, the shared state, the log router and a
//! submitter for follow-up tasks.
//!
//! ```rust
//! use mproc_core::registry::{handler_fn, HandlerRegistry, TaskOutput};
//!
//! let registry = HandlerRegistry::new();
//! registry.register("noop", handler_fn(|_ctx, _task| async { Ok(TaskOutput::new()) }));
//! assert!(registry.contains("noop"));
//! ```

mod context;
mod handler;

pub use context::TaskContext;
pub use handler::{handler_fn, FnHandler, TaskError, TaskHandler, TaskOutput};

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{OrchestraError, Result};

/// Callable-id to handler map shared by the orchestrator and its workers
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `callable`, replacing any previous one
    pub fn register<H: TaskHandler>(&self, callable: impl Into<String>, handler: H) {
        let callable = callable.into();
        debug!(callable = %callable, "REGISTRY: Handler registered");
        self.handlers.insert(callable, Arc::new(handler));
    }

    pub fn resolve(&self, callable: &str) -> Result<Arc<dyn TaskHandler>> {
        self.handlers
            .get(callable)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrchestraError::HandlerNotFound(callable.to_string()))
    }

    pub fn contains(&self, callable: &str) -> bool {
        self.handlers.contains_key(callable)
    }

    pub fn callables(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("callables", &self.callables())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_resolve_unknown_callable() {
        let registry = HandlerRegistry::new();
        registry.register("known", handler_fn(|_ctx, _task| async { Ok(TaskOutput::new()) }));
        assert!(registry.resolve("known").is_ok());
        assert_eq!(
            registry.resolve("unknown").err().map(|e| e.kind()),
            Some(ErrorKind::HandlerNotFound)
        );
        assert_eq!(registry.callables(), vec!["known"]);
    }
}
