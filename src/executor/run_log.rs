//! Per-run log artifacts.
//!
//! Every executor run writes one plain-text file, independent of the
//! in-memory history:
//!
//! ```text
//! logs/task_health_check_20260101_120000.123_1f2e3d4c.log
//! ```
//!
//! The content is meant for humans; nothing in this crate parses it back.

use super::ExecutionResult;
use crate::task::Task;
use std::fmt::Write as _;
use std::path::PathBuf;
use tokio::fs;

/// Writes one log file per task run
#[derive(Debug, Clone)]
pub struct RunLogWriter {
    logs_dir: PathBuf,
}

impl RunLogWriter {
    pub fn new(logs_dir: PathBuf) -> Self {
        Self { logs_dir }
    }

    pub fn logs_dir(&self) -> &std::path::Path {
        &self.logs_dir
    }

    /// Write the artifact for a run and return its path
    pub async fn write(
        &self,
        task: &Task,
        result: &ExecutionResult,
    ) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(&self.logs_dir).await?;
        let path = self.logs_dir.join(file_name(task, result));
        fs::write(&path, render(task, result)).await?;
        Ok(path)
    }
}

/// `task_<name>_<YYYYMMDD_HHMMSS.mmm>_<id8>.log`
pub fn file_name(task: &Task, result: &ExecutionResult) -> String {
    let name: String = task
        .name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let id = task.id.simple().to_string();

    format!(
        "task_{}_{}_{}.log",
        name,
        result.timestamp.format("%Y%m%d_%H%M%S%.3f"),
        &id[..8]
    )
}

pub fn render(task: &Task, result: &ExecutionResult) -> String {
    let task_info = serde_json::to_string_pretty(task)
        .unwrap_or_else(|e| format!("<unserializable task: {}>", e));

    let mut out = String::new();
    let _ = writeln!(out, "Task Execution Log");
    let _ = writeln!(out, "==================");
    let _ = writeln!(out, "Task: {}", task.name);
    let _ = writeln!(out, "Task ID: {}", task.id);
    let _ = writeln!(out, "Timestamp: {}", result.timestamp.to_rfc3339());
    let _ = writeln!(out, "Duration: {:.2}s", result.duration_seconds);
    let _ = writeln!(out, "Success: {}", result.success);
    let _ = writeln!(out, "Task Info: {}", task_info);
    let _ = writeln!(out, "\nOutput:\n{}", result.output);
    if !result.error.is_empty() {
        let _ = writeln!(out, "\nError:\n{}", result.error);
    }
    out
}
