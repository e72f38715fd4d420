//! Error types for the orchestration core.
//!
//! One variant per failure kind of the framework taxonomy, plus a handful of
//! ambient variants (configuration, I/O, database) that wrap lower layers.

use thiserror::Error;

use crate::config::ConfigurationError;

/// Coarse classification of an [`OrchestraError`], stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    KeyType,
    KeyMissing,
    StructuralLock,
    AccessPolicy,
    OwnershipViolation,
    DeletionForbidden,
    BackingStoreGone,
    HeapCorruption,
    IdConflict,
    PoolExhausted,
    WorkerLost,
    ShutdownTimeout,
    InitFailure,
    LogSinkFailure,
    LogRecursion,
    TraceConsistency,
    HeapClosed,
    HandlerNotFound,
    TaskFailed,
    Configuration,
    Io,
    Database,
}

#[derive(Debug, Error)]
pub enum OrchestraError {
    #[error("Key type error: {0}")]
    KeyType(String),

    #[error("Key '{key}' not found in '{container}'")]
    KeyMissing { container: String, key: String },

    #[error("Structural lock on '{container}' ({access}): {operation} not permitted")]
    StructuralLock {
        container: String,
        access: String,
        operation: String,
    },

    #[error("Access policy violation on '{container}': {reason}")]
    AccessPolicy { container: String, reason: String },

    #[error("Attribute '{attribute}' is owned by {owner}; write from {writer} rejected")]
    OwnershipViolation {
        attribute: String,
        owner: String,
        writer: String,
    },

    #[error("Attribute '{0}' cannot be deleted")]
    DeletionForbidden(String),

    #[error("Backing store '{0}' is gone")]
    BackingStoreGone(String),

    #[error("Heap corruption: {0}")]
    HeapCorruption(String),

    #[error("Task id conflict: tracked counter {tracked}, heap sequence {seq}")]
    IdConflict { tracked: u64, seq: u64 },

    #[error("Pool exhausted: {queued} entries queued (limit {limit}), back off")]
    PoolExhausted { queued: usize, limit: usize },

    #[error("Worker {slot} lost while running task {task_id:?}")]
    WorkerLost { slot: u32, task_id: Option<u64> },

    #[error("Shutdown grace period of {grace_ms}ms expired with {remaining} workers running")]
    ShutdownTimeout { grace_ms: u64, remaining: usize },

    #[error("Initialization failed: {0}")]
    InitFailure(String),

    #[error("Log sink '{sink}' failed: {reason}")]
    LogSinkFailure { sink: String, reason: String },

    #[error("Log recursion detected in {0}")]
    LogRecursion(String),

    #[error("Trace consistency error: {0}")]
    TraceConsistency(String),

    #[error("Priority heap '{0}' is closed")]
    HeapClosed(String),

    #[error("No handler registered for callable '{0}'")]
    HandlerNotFound(String),

    #[error("Task '{callable}' failed: {reason}")]
    TaskFailed { callable: String, reason: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),
}

impl OrchestraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::KeyType(_) => ErrorKind::KeyType,
            Self::KeyMissing { .. } => ErrorKind::KeyMissing,
            Self::StructuralLock { .. } => ErrorKind::StructuralLock,
            Self::AccessPolicy { .. } => ErrorKind::AccessPolicy,
            Self::OwnershipViolation { .. } => ErrorKind::OwnershipViolation,
            Self::DeletionForbidden(_) => ErrorKind::DeletionForbidden,
            Self::BackingStoreGone(_) => ErrorKind::BackingStoreGone,
            Self::HeapCorruption(_) => ErrorKind::HeapCorruption,
            Self::IdConflict { .. } => ErrorKind::IdConflict,
            Self::PoolExhausted { .. } => ErrorKind::PoolExhausted,
            Self::WorkerLost { .. } => ErrorKind::WorkerLost,
            Self::ShutdownTimeout { .. } => ErrorKind::ShutdownTimeout,
            Self::InitFailure(_) => ErrorKind::InitFailure,
            Self::LogSinkFailure { .. } => ErrorKind::LogSinkFailure,
            Self::LogRecursion(_) => ErrorKind::LogRecursion,
            Self::TraceConsistency(_) => ErrorKind::TraceConsistency,
            Self::HeapClosed(_) => ErrorKind::HeapClosed,
            Self::HandlerNotFound(_) => ErrorKind::HandlerNotFound,
            Self::TaskFailed { .. } => ErrorKind::TaskFailed,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Io(_) => ErrorKind::Io,
            Self::Database(_) => ErrorKind::Database,
        }
    }

    /// Fatal errors indicate a broken invariant; the orchestrator enters forced
    /// shutdown when it sees one in its own loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::LogRecursion
                | ErrorKind::IdConflict
                | ErrorKind::HeapCorruption
                | ErrorKind::InitFailure
        )
    }

    pub(crate) fn structural(container: &str, access: impl ToString, operation: &str) -> Self {
        Self::StructuralLock {
            container: container.to_string(),
            access: access.to_string(),
            operation: operation.to_string(),
        }
    }

    pub(crate) fn init(context: &str, cause: impl std::fmt::Display) -> Self {
        Self::InitFailure(format!("{context}: {cause}"))
    }
}

impl From<sqlx::Error> for OrchestraError {
    fn from(err: sqlx::Error) -> Self {
        OrchestraError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestraError {
    fn from(err: serde_json::Error) -> Self {
        OrchestraError::TaskFailed {
            callable: "serialization".to_string(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestraError>;
