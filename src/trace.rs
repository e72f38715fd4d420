//! # Trace Context
//!
//! Immutable per-operation record describing the call chain and the identity
//! of the executing process. Every transformation returns a new value, so a
//! callee can never leak changes into its caller's context.

use serde::{Deserialize, Serialize};

use crate::constants::ORCHESTRATOR_WID;
use crate::error::{OrchestraError, Result};

/// Scoped switches carried along the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFlags {
    pub log_enable: bool,
    pub print_enable: bool,
    pub interrupt_enable: bool,
}

impl Default for TraceFlags {
    fn default() -> Self {
        Self {
            log_enable: true,
            print_enable: true,
            interrupt_enable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceContext {
    module: String,
    operation: String,
    chain: Vec<String>,
    max_depth: usize,
    pid: u32,
    wid: u32,
    tid: Option<u64>,
    flags: TraceFlags,
    #[serde(skip)]
    dispatching: bool,
}

impl TraceContext {
    /// Entry point of a chain, attributed to the current process and the
    /// orchestrator slot
    pub fn root(module: &str, operation: &str, max_depth: usize) -> Self {
        Self {
            module: module.to_string(),
            operation: operation.to_string(),
            chain: vec![format!("{module}.{operation}")],
            max_depth: max_depth.max(1),
            pid: std::process::id(),
            wid: ORCHESTRATOR_WID,
            tid: None,
            flags: TraceFlags::default(),
            dispatching: false,
        }
    }

    /// Step into `module.operation`
    pub fn enter(&self, module: &str, operation: &str) -> Result<Self> {
        if self.chain.len() >= self.max_depth {
            return Err(OrchestraError::TraceConsistency(format!(
                "chain depth {} exceeds maximum {} entering {module}.{operation} from {}",
                self.chain.len() + 1,
                self.max_depth,
                self.chain()
            )));
        }
        let mut next = self.clone();
        next.module = module.to_string();
        next.operation = operation.to_string();
        next.chain.push(format!("{module}.{operation}"));
        Ok(next)
    }

    pub fn rehydrate(&self, pid: u32, wid: u32, tid: Option<u64>) -> Self {
        Self {
            pid,
            wid,
            tid,
            ..self.clone()
        }
    }

    pub fn with_flags(&self, flags: TraceFlags) -> Self {
        Self {
            flags,
            ..self.clone()
        }
    }

    pub(crate) fn dispatching_clone(&self) -> Self {
        Self {
            flags: TraceFlags {
                log_enable: false,
                ..self.flags
            },
            dispatching: true,
            ..self.clone()
        }
    }

    pub(crate) fn is_dispatching(&self) -> bool {
        self.dispatching
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// `>`-joined path of every operation on the chain
    pub fn chain(&self) -> String {
        self.chain.join(">")
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn wid(&self) -> u32 {
        self.wid
    }

    pub fn tid(&self) -> Option<u64> {
        self.tid
    }

    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    pub fn is_orchestrator(&self) -> bool {
        self.wid == ORCHESTRATOR_WID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_enter_does_not_touch_parent() {
        let root = TraceContext::root("app", "main", 8);
        let child = root.enter("heap", "push").unwrap();
        assert_eq!(root.chain(), "app.main");
        assert_eq!(child.chain(), "app.main>heap.push");
        assert_eq!(child.module(), "heap");
        assert_eq!(child.depth(), 2);
    }

    #[test]
    fn test_depth_limit() {
        let root = TraceContext::root("app", "main", 2);
        let child = root.enter("a", "b").unwrap();
        let err = child.enter("c", "d").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TraceConsistency);
    }

    #[test]
    fn test_rehydrate_sets_identity() {
        let root = TraceContext::root("app", "main", 8);
        assert!(root.is_orchestrator());
        let worker = root.rehydrate(4242, 3, Some(17));
        assert_eq!((worker.pid(), worker.wid(), worker.tid()), (4242, 3, Some(17)));
        assert!(!worker.is_orchestrator());
        assert_eq!(root.tid(), None);
    }

    #[test]
    fn test_dispatching_clone_disables_logging() {
        let root = TraceContext::root("app", "main", 8);
        let clone = root.dispatching_clone();
        assert!(clone.is_dispatching());
        assert!(!clone.flags().log_enable);
        assert!(root.flags().log_enable);
        assert!(!root.is_dispatching());
    }
}
