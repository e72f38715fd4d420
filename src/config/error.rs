//! Errors raised while locating, parsing and checking `mproc-config.yaml`.

use std::path::PathBuf;
use thiserror::Error;

use crate::log_router::LogLevel;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("No mproc-config.yaml found; searched {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    #[error("Could not read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Syntax errors and values serde could not map onto [`MprocConfig`](super::MprocConfig)
    #[error("'{file}' is not a valid mproc configuration: {detail}")]
    InvalidYaml { file: String, detail: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown log level '{0}'")]
    UnknownLevel(String),

    #[error("Unknown language '{language}', mproc ships tables for {supported:?}")]
    UnknownLanguage {
        language: String,
        supported: Vec<String>,
    },

    /// Neither a built-in environment nor a section of the file
    #[error("Environment '{environment}' has no section in '{file}' (built-in: {known:?})")]
    UnknownEnvironment {
        environment: String,
        file: String,
        known: Vec<String>,
    },

    #[error("Section '{environment}' must be a mapping to merge over the base values")]
    EnvironmentSection { environment: String },

    /// Listed in `interrupt_levels` but dropped by every sink
    #[error("Interrupt level '{0}' is in both no_log_levels and no_print_levels and can never pause the run")]
    SilentInterruptLevel(LogLevel),
}

impl ConfigurationError {
    pub fn invalid_yaml(file: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::InvalidYaml {
            file: file.into(),
            detail: detail.to_string(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
