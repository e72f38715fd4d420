use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigurationError;

/// Severity of a routed log record, in ascending order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Init,
    Debug,
    Info,
    Warning,
    Denied,
    Error,
    Critical,
    Exit,
    Undefined,
}

impl LogLevel {
    pub const ALL: [LogLevel; 9] = [
        LogLevel::Init,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Denied,
        LogLevel::Error,
        LogLevel::Critical,
        LogLevel::Exit,
        LogLevel::Undefined,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Init => "init",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Denied => "denied",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
            LogLevel::Exit => "exit",
            LogLevel::Undefined => "undefined",
        }
    }

    /// Upper-case label used as the record header in text sinks
    pub fn label(self) -> String {
        self.as_str().to_uppercase()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| ConfigurationError::UnknownLevel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered_by_severity() {
        assert!(LogLevel::Debug < LogLevel::Error);
        assert!(LogLevel::Critical < LogLevel::Exit);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&LogLevel::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let level: LogLevel = serde_yaml::from_str("denied").unwrap();
        assert_eq!(level, LogLevel::Denied);
    }
}
