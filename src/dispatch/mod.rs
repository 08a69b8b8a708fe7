//! # Dispatch
//!
//! Bridges the queue and the executor: pops the highest-priority task,
//! resolves its executable unit and hands it to the [`TaskExecutor`].
//!
//! Resolution order for a task name:
//!
//! 1. the [`UnitRegistry`]; an entry with `enabled = false` is a hard miss
//! 2. `<scripts_dir>/<name>` on disk, as an enabled external-process unit
//!
//! A task whose unit cannot be resolved is consumed from the queue, skipped
//! with a warning and reported in [`DispatchReport::undispatchable`]; it never
//! reaches the executor and never touches execution history.

use crate::executor::{ExecutionResult, TaskExecutor};
use crate::registry::{UnitDescriptor, UnitRegistry};
use crate::task::{Task, TaskId, TaskQueue};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A task removed from the queue without being executed
#[derive(Debug, Clone, Serialize)]
pub struct UndispatchableTask {
    pub task_id: TaskId,
    pub name: String,
    pub reason: String,
}

/// Outcome of one dispatch cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    /// Results in dispatch order
    pub executed: Vec<ExecutionResult>,
    pub undispatchable: Vec<UndispatchableTask>,
}

impl DispatchReport {
    pub fn dispatched_count(&self) -> usize {
        self.executed.len()
    }

    pub fn success_count(&self) -> usize {
        self.executed.iter().filter(|r| r.success).count()
    }
}

pub struct Dispatcher {
    queue: Arc<Mutex<TaskQueue>>,
    registry: Arc<dyn UnitRegistry>,
    scripts_dir: PathBuf,
    executor: Arc<TaskExecutor>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<Mutex<TaskQueue>>,
        registry: Arc<dyn UnitRegistry>,
        scripts_dir: impl Into<PathBuf>,
        executor: Arc<TaskExecutor>,
    ) -> Self {
        Self {
            queue,
            registry,
            scripts_dir: scripts_dir.into(),
            executor,
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Find the executable unit for a task name
    pub fn resolve_unit(&self, name: &str) -> Option<UnitDescriptor> {
        self.try_resolve(name).ok()
    }

    fn try_resolve(&self, name: &str) -> Result<UnitDescriptor, String> {
        if let Some(unit) = self.registry.resolve(name) {
            if !unit.enabled {
                warn!("Unit is disabled: {}", name);
                return Err(format!("unit '{}' is disabled", name));
            }
            debug!("Resolved unit {} from registry: {}", name, unit.location);
            return Ok(unit);
        }

        let candidate = self.scripts_dir.join(name);
        if candidate.is_file() {
            debug!("Resolved unit {} from scripts dir: {:?}", name, candidate);
            return Ok(UnitDescriptor::external(
                name,
                candidate.to_string_lossy().into_owned(),
            ));
        }

        warn!("Unit not found: {}", name);
        Err(format!("no unit named '{}' in registry or {:?}", name, self.scripts_dir))
    }

    /// Pop and execute up to `max_count` tasks.
    ///
    /// Stops early when the queue is empty. Undispatchable tasks are consumed
    /// but do not count toward `max_count`.
    pub async fn dispatch(&self, max_count: usize) -> DispatchReport {
        let mut report = DispatchReport::default();

        while report.executed.len() < max_count {
            let Some(task) = self.next_ready(&mut report).await else {
                break;
            };
            report.executed.push(self.executor.run(task).await);
        }

        info!(
            "Dispatch cycle finished: {} executed, {} undispatchable",
            report.executed.len(),
            report.undispatchable.len()
        );
        report
    }

    /// Pop up to `max_count` resolvable tasks without running them
    pub async fn take_ready(&self, max_count: usize) -> (Vec<Task>, Vec<UndispatchableTask>) {
        let mut report = DispatchReport::default();
        let mut ready = Vec::new();

        while ready.len() < max_count {
            match self.next_ready(&mut report).await {
                Some(task) => ready.push(task),
                None => break,
            }
        }

        (ready, report.undispatchable)
    }

    /// Pop tasks until one resolves or the queue runs dry
    async fn next_ready(&self, report: &mut DispatchReport) -> Option<Task> {
        loop {
            // The lock is released before the unit runs
            let mut task = self.queue.lock().await.pop_next()?;

            match self.try_resolve(&task.name) {
                Ok(unit) => {
                    task.unit = Some(unit);
                    return Some(task);
                }
                Err(reason) => {
                    warn!("Skipping undispatchable task {}: {}", task.name, reason);
                    report.undispatchable.push(UndispatchableTask {
                        task_id: task.id,
                        name: task.name,
                        reason,
                    });
                }
            }
        }
    }
}
