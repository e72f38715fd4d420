use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::LogLevel;
use crate::task::Fingerprint;
use crate::trace::TraceContext;

/// Composite record built once the message producer has run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    pub module: String,
    pub operation: String,
    pub chain: String,
    pub pid: u32,
    pub wid: u32,
    pub tid: Option<u64>,
    pub message: String,
    /// Whether an interrupt-class level may pause the run for this record
    pub interrupt_enable: bool,
    /// Reaches the text and SQL sinks
    #[serde(skip)]
    pub persist: bool,
    /// Reaches stdout
    #[serde(skip)]
    pub print: bool,
}

impl LogRecord {
    pub fn new(trace: &TraceContext, level: LogLevel, message: String) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            module: trace.module().to_string(),
            operation: trace.operation().to_string(),
            chain: trace.chain(),
            pid: trace.pid(),
            wid: trace.wid(),
            tid: trace.tid(),
            message,
            interrupt_enable: trace.flags().interrupt_enable,
            persist: true,
            print: true,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&(
            self.level,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.pid,
            self.wid,
            self.tid,
            &self.chain,
            &self.message,
        ))
    }

    /// `pid=.. wid=.. tid=..` line shared by the text and console sinks
    pub fn ids(&self) -> String {
        let tid = self
            .tid
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!("pid={} wid={} tid={}", self.pid, self.wid, tid)
    }

    /// Text file layout:
    /// `LEVEL - <iso>\n\t<trace>\n\t<ids>\n\n\t<indented message>\n`
    pub fn render_text(&self) -> String {
        let message = self
            .message
            .lines()
            .collect::<Vec<_>>()
            .join("\n\t");
        format!(
            "{} - {}\n\t{}\n\t{}\n\n\t{}\n",
            self.level.label(),
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.chain,
            self.ids(),
            message
        )
    }

    pub fn render_console(&self) -> String {
        format!(
            "{} - {} [{}] {}",
            self.level.label(),
            self.timestamp.format("%H:%M:%S%.3f"),
            self.ids(),
            self.message
        )
    }
}
