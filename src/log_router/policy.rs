use std::collections::BTreeSet;

use super::LogLevel;
use crate::config::MprocConfig;
use crate::trace::TraceContext;

/// Which sinks a record at a given level reaches
#[derive(Debug, Clone, PartialEq)]
pub struct LogPolicy {
    pub log_enable: bool,
    pub text_enable: bool,
    pub sql_enable: bool,
    pub console_enable: bool,
    pub no_log: BTreeSet<LogLevel>,
    pub no_print: BTreeSet<LogLevel>,
    pub interrupt_on: BTreeSet<LogLevel>,
}

impl LogPolicy {
    pub fn from_config(config: &MprocConfig) -> Self {
        Self {
            log_enable: config.log_enable,
            text_enable: config.log_text_enable,
            sql_enable: config.log_sql_enable,
            console_enable: config.log_to_console,
            no_log: config.no_log_levels.clone(),
            no_print: config.no_print_levels.clone(),
            interrupt_on: config.interrupt_levels.clone(),
        }
    }

    /// Record reaches the text or SQL sink
    pub fn persists(&self, trace: &TraceContext, level: LogLevel) -> bool {
        self.log_enable
            && trace.flags().log_enable
            && (self.text_enable || self.sql_enable)
            && !self.no_log.contains(&level)
    }

    /// Record reaches stdout
    pub fn prints(&self, trace: &TraceContext, level: LogLevel) -> bool {
        self.console_enable && trace.flags().print_enable && !self.no_print.contains(&level)
    }

    pub fn suppressed_everywhere(&self, trace: &TraceContext, level: LogLevel) -> bool {
        !self.persists(trace, level) && !self.prints(trace, level)
    }

    pub fn interrupts(&self, level: LogLevel) -> bool {
        self.interrupt_on.contains(&level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceFlags;

    #[test]
    fn test_level_on_both_lists_is_suppressed() {
        let mut config = MprocConfig::default();
        config.log_text_enable = true;
        config.no_log_levels.insert(LogLevel::Debug);
        config.no_print_levels.insert(LogLevel::Debug);
        let policy = LogPolicy::from_config(&config);
        let trace = TraceContext::root("app", "main", 4);

        assert!(policy.suppressed_everywhere(&trace, LogLevel::Debug));
        assert!(!policy.suppressed_everywhere(&trace, LogLevel::Info));
    }

    #[test]
    fn test_trace_flags_scope_sinks() {
        let mut config = MprocConfig::default();
        config.log_text_enable = true;
        let policy = LogPolicy::from_config(&config);
        let quiet = TraceContext::root("app", "main", 4).with_flags(TraceFlags {
            log_enable: false,
            print_enable: false,
            interrupt_enable: true,
        });
        assert!(policy.suppressed_everywhere(&quiet, LogLevel::Error));
    }
}
