//! Log sinks: console, append-only text file, and an embedded SQL table.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, SqliteConnection};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::LogRecord;
use crate::error::{OrchestraError, Result};

#[async_trait]
pub trait LogSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn write(&self, record: &LogRecord) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct ConsoleSink;

#[async_trait]
impl LogSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn write(&self, record: &LogRecord) -> Result<()> {
        print_line(&record.render_console())?;
        Ok(())
    }
}

/// stdout with an immediate flush
pub(crate) fn print_line(line: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()
}

pub struct TextFileSink {
    path: PathBuf,
}

impl TextFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogSink for TextFileSink {
    fn name(&self) -> &'static str {
        "text"
    }

    async fn write(&self, record: &LogRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(record.render_text().as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

struct SqlConnection {
    conn: SqliteConnection,
    table_ready: bool,
}

/// One table per run, `log_<run-stamp>`, written through a single
/// connection. The connection is opened on first use.
pub struct SqlSink {
    path: PathBuf,
    table: String,
    conn: Mutex<Option<SqlConnection>>,
}

impl SqlSink {
    pub fn new(path: impl Into<PathBuf>, run_stamp: &str) -> Self {
        let stamp = run_stamp
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect::<String>();
        Self {
            path: path.into(),
            table: format!("log_{stamp}"),
            conn: Mutex::new(None),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let conn = SqliteConnection::connect_with(&options).await?;
        debug!(path = %self.path.display(), table = %self.table, "LOG: SQL sink connected");
        Ok(conn)
    }
}

#[async_trait]
impl LogSink for SqlSink {
    fn name(&self) -> &'static str {
        "sql"
    }

    async fn write(&self, record: &LogRecord) -> Result<()> {
        let tid = record
            .tid
            .map(i64::try_from)
            .transpose()
            .map_err(|_| OrchestraError::LogSinkFailure {
                sink: "sql".to_string(),
                reason: format!("task id {:?} does not fit an INTEGER column", record.tid),
            })?;

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(SqlConnection {
                conn: self.connect().await?,
                table_ready: false,
            });
        }
        let Some(slot) = guard.as_mut() else {
            return Err(OrchestraError::LogSinkFailure {
                sink: "sql".to_string(),
                reason: "connection unavailable".to_string(),
            });
        };

        if !slot.table_ready {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (\
                 id INTEGER PRIMARY KEY, level TEXT, pid INTEGER, wid INTEGER, tid INTEGER, \
                 ts DATETIME, module TEXT, operation TEXT, trace TEXT, message TEXT)",
                self.table
            );
            sqlx::query(&ddl).execute(&mut slot.conn).await?;
            slot.table_ready = true;
        }

        let insert = format!(
            "INSERT INTO \"{}\" (level, pid, wid, tid, ts, module, operation, trace, message) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.table
        );
        sqlx::query(&insert)
            .bind(record.level.as_str())
            .bind(i64::from(record.pid))
            .bind(i64::from(record.wid))
            .bind(tid)
            .bind(record.timestamp)
            .bind(&record.module)
            .bind(&record.operation)
            .bind(&record.chain)
            .bind(&record.message)
            .execute(&mut slot.conn)
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(slot) = self.conn.lock().await.take() {
            slot.conn.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_router::LogLevel;
    use crate::trace::TraceContext;
    use sqlx::Row;

    fn record(message: &str) -> LogRecord {
        let trace = TraceContext::root("sink", "test", 4).rehydrate(1, 2, Some(3));
        LogRecord::new(&trace, LogLevel::Info, message.to_string())
    }

    #[tokio::test]
    async fn test_text_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let sink = TextFileSink::new(dir.path().join("nested").join("run.txt"));
        sink.write(&record("one")).await.unwrap();
        sink.write(&record("two")).await.unwrap();

        let text = tokio::fs::read_to_string(sink.path()).await.unwrap();
        assert_eq!(text.matches("INFO - ").count(), 2);
        assert!(text.contains("\tone\n"));
        assert!(text.contains("\ttwo\n"));
    }

    #[tokio::test]
    async fn test_sql_sink_creates_run_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.sqlite");
        let sink = SqlSink::new(&path, "20260101_000000-ab");
        assert_eq!(sink.table(), "log_20260101_000000_ab");
        sink.write(&record("persisted")).await.unwrap();
        sink.write(&record("again")).await.unwrap();

        let mut conn = SqliteConnection::connect_with(&SqliteConnectOptions::new().filename(&path))
            .await
            .unwrap();
        let rows = sqlx::query(&format!("SELECT level, wid, tid, message FROM \"{}\" ORDER BY id", sink.table()))
            .fetch_all(&mut conn)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get::<String, _>("level"), "info");
        assert_eq!(rows[0].get::<i64, _>("wid"), 2);
        assert_eq!(rows[0].get::<Option<i64>, _>("tid"), Some(3));
        assert_eq!(rows[1].get::<String, _>("message"), "again");

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn test_sql_sink_rejects_out_of_range_task_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.sqlite");
        let sink = SqlSink::new(&path, "20260101_000000-cd");
        let trace = TraceContext::root("sink", "test", 4).rehydrate(1, 2, Some(u64::MAX));
        let oversized = LogRecord::new(&trace, LogLevel::Info, "too big".to_string());

        let err = sink.write(&oversized).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::LogSinkFailure);
        assert!(!path.exists());

        sink.write(&record("fits")).await.unwrap();
        let mut conn = SqliteConnection::connect_with(&SqliteConnectOptions::new().filename(&path))
            .await
            .unwrap();
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", sink.table()))
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
