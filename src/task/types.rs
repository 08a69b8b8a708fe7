use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::registry::UnitDescriptor;

/// Unique identifier for tasks
pub type TaskId = Uuid;

/// Opaque supplementary context passed through to the executor and run logs
pub type TaskMetadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding a per-task timeout override in seconds
pub const TIMEOUT_OVERRIDE_KEY: &str = "timeout";

/// A unit of requested work
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub kind: TaskKind,
    pub priority: i32,
    pub trigger_source: String,
    pub metadata: TaskMetadata,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    /// Insertion order within the owning queue; breaks priority ties
    pub sequence: u64,
    /// Executable unit attached by the dispatcher after resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitDescriptor>,
}

/// Closed category tag used for reporting and filtering only
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Utility,
    Data,
    Ai,
    Learning,
    Maintenance,
}

/// Named priority levels. The queue itself only ever sees the integer.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Urgent = 4,
}

/// Lifecycle of a task: `Queued -> Dispatched -> {Succeeded | Failed}`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Dispatched,
    Succeeded,
    Failed,
}

/// Origin of a task, rendered into the free-form `trigger_source` label
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerSource {
    Manual,
    Schedule(String),
    Command(String),
    Goal(String),
}

/// Errors raised by task state handling
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Illegal status transition for task {task_id}: {from:?} -> {to:?}")]
    IllegalTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Request for a new task, consumed by [`crate::task::TaskQueue::enqueue`]
#[derive(Clone, Debug)]
pub struct TaskRequest {
    pub name: String,
    pub kind: TaskKind,
    pub priority: i32,
    pub trigger_source: String,
    pub metadata: TaskMetadata,
}

impl TaskRequest {
    /// Create a manual, utility-type request at normal priority
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TaskKind::Utility,
            priority: TaskPriority::Normal.value(),
            trigger_source: TriggerSource::Manual.to_string(),
            metadata: TaskMetadata::new(),
        }
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set priority from a named level or any raw integer
    pub fn with_priority(mut self, priority: impl Into<i32>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn with_trigger(mut self, source: impl fmt::Display) -> Self {
        self.trigger_source = source.to_string();
        self
    }

    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set a per-task timeout override (still capped by the executor ceiling)
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_metadata_entry(TIMEOUT_OVERRIDE_KEY, timeout.as_secs_f64())
    }
}

impl Task {
    /// Build a queued task from a request
    pub fn new(request: TaskRequest, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: request.name,
            kind: request.kind,
            priority: request.priority,
            trigger_source: request.trigger_source,
            metadata: request.metadata,
            created_at: Utc::now(),
            status: TaskStatus::Queued,
            sequence,
            unit: None,
        }
    }

    /// Advance the status, rejecting backward or skipping transitions
    pub fn advance(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_advance_to(next) {
            return Err(TaskError::IllegalTransition {
                task_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Timeout override from metadata, if present and positive
    pub fn timeout_override(&self) -> Option<Duration> {
        self.metadata
            .get(TIMEOUT_OVERRIDE_KEY)
            .and_then(|value| value.as_f64())
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    /// Fresh task for a caller-driven retry. The original is never re-queued.
    pub fn resubmission(&self, attempt: u32) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.insert("retry_of".to_string(), self.id.to_string().into());
        metadata.insert("attempt".to_string(), attempt.into());

        Self {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            kind: self.kind,
            priority: self.priority,
            trigger_source: self.trigger_source.clone(),
            metadata,
            created_at: Utc::now(),
            status: TaskStatus::Dispatched,
            sequence: self.sequence,
            unit: self.unit.clone(),
        }
    }
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    fn can_advance_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Dispatched)
                | (TaskStatus::Dispatched, TaskStatus::Succeeded)
                | (TaskStatus::Dispatched, TaskStatus::Failed)
        )
    }
}

impl TaskPriority {
    pub fn value(&self) -> i32 {
        *self as i32
    }
}

impl From<TaskPriority> for i32 {
    fn from(priority: TaskPriority) -> Self {
        priority.value()
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskKind::Utility => "utility",
            TaskKind::Data => "data",
            TaskKind::Ai => "ai",
            TaskKind::Learning => "learning",
            TaskKind::Maintenance => "maintenance",
        };
        f.write_str(label)
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Manual => f.write_str("manual"),
            TriggerSource::Schedule(period) => write!(f, "schedule:{}", period),
            TriggerSource::Command(name) => write!(f, "command:{}", name),
            TriggerSource::Goal(name) => write!(f, "goal:{}", name),
        }
    }
}
