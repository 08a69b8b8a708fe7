//! # Bounded Task Execution
//!
//! Runs one task's executable unit under a wall-clock budget, captures the
//! outcome as an [`ExecutionResult`], writes a per-run log artifact and
//! appends the outcome to a bounded in-memory history.
//!
//! ## Core Components
//!
//! - **[`TaskExecutor`]**: runs tasks, batches and caller-driven retries
//! - **[`in_process`]**: entry points registered in a [`UnitCatalog`], run on
//!   a dedicated thread with an advisory timeout watcher
//! - **[`host`]**: external executables run as child processes, killed on
//!   timeout
//! - **[`history`]**: FIFO-bounded [`ExecutionHistory`] and [`ExecutionStats`]
//! - **[`run_log`]**: one plain-text artifact per run
//! - **[`retry`]**: [`RetryPolicy`] with exponential backoff
//!
//! ## Timeouts
//!
//! The effective budget is `min(metadata timeout override or default, max)`.
//!
//! In-process units cannot be preempted. When the budget elapses the watcher
//! raises the unit's [`CancelFlag`] and the caller gets a timeout result at
//! that point; the unit thread keeps running until it returns or observes
//! the flag. "Watcher fired at T" and "unit stopped at T" are distinct.
//!
//! External processes are killed when the budget elapses.
//!
//! ```text
//!        Task (with UnitDescriptor)
//!                  ↓
//!         TaskExecutor::run()
//!                  ↓
//!        ┌─────────┴─────────┐
//!    InProcess         ExternalProcess
//!   (thread + watcher)   (child + kill)
//!        └─────────┬─────────┘
//!                  ↓
//!   ExecutionResult → run log + history
//! ```

use crate::registry::UnitKind;
use crate::task::{Task, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Bounded execution history and statistics.
pub mod history;

/// External-process units.
pub mod host;

/// In-process units: catalog, entry points and the timeout watcher.
pub mod in_process;

/// Caller-driven retry with backoff.
pub mod retry;

/// Per-run log artifacts.
pub mod run_log;

pub use history::{ExecutionHistory, ExecutionHistoryEntry, ExecutionStats};
pub use in_process::{
    CancelFlag, EntryPoint, UnitCatalog, UnitContext, UnitFault, entry_point,
    entry_point_without_context,
};
pub use retry::RetryPolicy;
pub use run_log::RunLogWriter;

/// Output used when a unit succeeds without producing anything
pub const DEFAULT_SUCCESS_OUTPUT: &str = "Unit executed successfully";

const OUTPUT_PREVIEW_CHARS: usize = 500;

/// Outcome of one executor run. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_id: TaskId,
    pub success: bool,
    /// Return value or stdout; partial output is kept on failure
    pub output: String,
    pub error: String,
    pub error_kind: Option<FailureKind>,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

/// Classification of a failed run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    NotFound,
    Fault,
    NonZeroExit,
}

/// Errors produced while running a unit
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum UnitError {
    /// Wall-clock budget elapsed
    #[error("Unit timed out after {:.2} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    /// The unit could not be located or loaded
    #[error("Unit not found: {0}")]
    NotFound(String),

    /// The unit raised a fault
    #[error("{0}")]
    Fault(UnitFault),

    /// External process finished with a nonzero status
    #[error("Process exited with status {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
}

impl UnitError {
    pub fn kind(&self) -> FailureKind {
        match self {
            UnitError::Timeout(_) => FailureKind::Timeout,
            UnitError::NotFound(_) => FailureKind::NotFound,
            UnitError::Fault(_) => FailureKind::Fault,
            UnitError::NonZeroExit { .. } => FailureKind::NonZeroExit,
        }
    }
}

/// Raw outcome of a unit run, before timing and bookkeeping
#[derive(Debug, Clone)]
pub struct UnitRun {
    pub output: String,
    pub error: Option<UnitError>,
}

impl UnitRun {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(output: impl Into<String>, error: UnitError) -> Self {
        Self {
            output: output.into(),
            error: Some(error),
        }
    }
}

impl ExecutionResult {
    fn from_run(task_id: TaskId, run: UnitRun, duration: Duration) -> Self {
        let (success, error, error_kind) = match run.error {
            None => (true, String::new(), None),
            Some(err) => (false, err.to_string(), Some(err.kind())),
        };

        Self {
            task_id,
            success,
            output: run.output,
            error,
            error_kind,
            duration_seconds: duration.as_secs_f64(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.error_kind == Some(FailureKind::Timeout)
    }
}

/// Configuration for the task executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub default_timeout: Duration,
    /// Hard ceiling; overrides can never exceed it
    pub max_timeout: Duration,
    pub history_capacity: usize,
    /// Pause between consecutive runs of a batch
    pub batch_pause: Duration,
    /// Working directory for external processes and relative unit paths
    pub working_dir: PathBuf,
    /// Directory for per-run log artifacts; `None` disables them
    pub run_log_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(300),
            max_timeout: Duration::from_secs(1800),
            history_capacity: 100,
            batch_pause: Duration::from_secs(1),
            working_dir: PathBuf::from("."),
            run_log_dir: None,
        }
    }
}

/// Runs tasks under a timeout and records their outcomes
pub struct TaskExecutor {
    config: ExecutorConfig,
    catalog: Arc<UnitCatalog>,
    history: RwLock<ExecutionHistory>,
    run_log: Option<RunLogWriter>,
}

impl TaskExecutor {
    pub fn new(config: ExecutorConfig, catalog: UnitCatalog) -> Self {
        let run_log = config.run_log_dir.clone().map(RunLogWriter::new);
        Self {
            history: RwLock::new(ExecutionHistory::new(config.history_capacity)),
            catalog: Arc::new(catalog),
            config,
            run_log,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &UnitCatalog {
        &self.catalog
    }

    /// `min(override or default, max)`
    pub fn effective_timeout(&self, task: &Task) -> Duration {
        task.timeout_override()
            .unwrap_or(self.config.default_timeout)
            .min(self.config.max_timeout)
    }

    /// Run one task. Never fails: every fault becomes a failed result.
    pub async fn run(&self, mut task: Task) -> ExecutionResult {
        let timeout = self.effective_timeout(&task);
        info!(
            "Starting execution of task: {} (ID: {}, timeout: {:.2}s)",
            task.name,
            task.id,
            timeout.as_secs_f64()
        );

        let start = Instant::now();
        let run = match task.unit.as_ref() {
            None => UnitRun::failed(
                String::new(),
                UnitError::NotFound(format!("no unit attached to task '{}'", task.name)),
            ),
            Some(unit) if !unit.enabled => UnitRun::failed(
                String::new(),
                UnitError::NotFound(format!("unit '{}' is disabled", unit.name)),
            ),
            Some(unit) => match unit.kind {
                UnitKind::InProcess => {
                    in_process::run_unit(&self.catalog, unit, &task, timeout).await
                }
                UnitKind::ExternalProcess => {
                    host::run_unit(unit, &task, timeout, &self.config.working_dir).await
                }
            },
        };
        let result = ExecutionResult::from_run(task.id, run, start.elapsed());

        self.settle_status(&mut task, result.success);
        self.log_execution_result(&task, &result).await;
        self.history.write().await.record(task, result.clone());

        result
    }

    /// Run tasks strictly one after another, results in submission order
    pub async fn execute_batch(&self, tasks: Vec<Task>) -> Vec<ExecutionResult> {
        let total = tasks.len();
        let mut results = Vec::with_capacity(total);

        info!("Starting batch execution of {} tasks", total);

        for (index, task) in tasks.into_iter().enumerate() {
            if index > 0 && !self.config.batch_pause.is_zero() {
                tokio::time::sleep(self.config.batch_pause).await;
            }
            info!("Executing task {}/{}: {}", index + 1, total, task.name);
            results.push(self.run(task).await);
        }

        let successful = results.iter().filter(|r| r.success).count();
        info!(
            "Batch execution completed: {}/{} tasks successful",
            successful, total
        );

        results
    }

    /// Run a task, resubmitting fresh copies while the policy allows.
    ///
    /// Returns one result per attempt, in order.
    pub async fn run_with_retry(&self, task: Task, policy: &RetryPolicy) -> Vec<ExecutionResult> {
        let mut results = Vec::new();
        let mut attempt = 1;
        let mut current = task;

        loop {
            let template = current.clone();
            let result = self.run(current).await;
            let retry = policy.should_retry(&result, attempt);
            results.push(result);

            if !retry {
                break;
            }

            let delay = policy.delay_for(attempt);
            info!(
                "Retrying task {} in {:?} (attempt {}/{})",
                template.name,
                delay,
                attempt + 1,
                policy.max_attempts
            );
            tokio::time::sleep(delay).await;

            attempt += 1;
            current = template.resubmission(attempt);
        }

        results
    }

    /// Statistics over the in-memory history only
    pub async fn execution_stats(&self) -> ExecutionStats {
        self.history.read().await.stats()
    }

    pub async fn history(&self) -> Vec<ExecutionHistoryEntry> {
        self.history.read().await.snapshot()
    }

    fn settle_status(&self, task: &mut Task, success: bool) {
        if task.status == TaskStatus::Queued {
            // Direct callers may hand over tasks that never went through a queue
            task.status = TaskStatus::Dispatched;
        }
        let next = if success {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        };
        if let Err(e) = task.advance(next) {
            warn!("{}", e);
        }
    }

    async fn log_execution_result(&self, task: &Task, result: &ExecutionResult) {
        if result.success {
            info!(
                "Task '{}' completed successfully in {:.2}s",
                task.name, result.duration_seconds
            );
            if !result.output.is_empty() {
                debug!("Task output: {}", preview(&result.output));
            }
        } else {
            error!(
                "Task '{}' failed after {:.2}s",
                task.name, result.duration_seconds
            );
            error!("Error: {}", result.error);
        }

        if let Some(writer) = &self.run_log {
            match writer.write(task, result).await {
                Ok(path) => debug!("Wrote task log {:?}", path),
                Err(e) => error!("Failed to write task log: {}", e),
            }
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > OUTPUT_PREVIEW_CHARS {
        let truncated: String = text.chars().take(OUTPUT_PREVIEW_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}
