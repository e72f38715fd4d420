//! Host facts recorded in the `sys` compartment.

use chrono::Utc;
use serde::Serialize;
use sysinfo::System;
use tracing::debug;

use crate::shared::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemFacts {
    pub os_name: String,
    pub os_version: String,
    pub host_name: String,
    pub logical_cpus: usize,
    pub total_memory_mb: u64,
    pub available_memory_mb: u64,
    pub user: String,
    pub elevated: bool,
    pub pid: u32,
    pub started_at: String,
}

impl SystemFacts {
    pub fn gather() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let facts = Self {
            os_name: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_version: System::os_version().unwrap_or_default(),
            host_name: System::host_name().unwrap_or_default(),
            logical_cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            total_memory_mb: sys.total_memory() / (1024 * 1024),
            available_memory_mb: sys.available_memory() / (1024 * 1024),
            user: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_default(),
            elevated: is_elevated(),
            pid: std::process::id(),
            started_at: Utc::now().to_rfc3339(),
        };

        debug!(
            os = %facts.os_name,
            cpus = facts.logical_cpus,
            total_mb = facts.total_memory_mb,
            elevated = facts.elevated,
            "SYS: Host facts gathered"
        );
        facts
    }

    pub fn to_value(&self) -> Value {
        Value::from(serde_json::to_value(self).unwrap_or_default())
    }
}

/// Effective uid 0, read from the ownership of `/proc/self`
#[cfg(unix)]
fn is_elevated() -> bool {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self")
        .map(|meta| meta.uid() == 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_elevated() -> bool {
    false
}
