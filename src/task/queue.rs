use crate::task::types::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// In-memory priority queue of pending tasks.
///
/// Not synchronized on its own; owners that share it across callers must
/// hold a lock across [`TaskQueue::pop_next`] so each task is dispatched at
/// most once.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Vec<Task>,
    next_sequence: u64,
}

/// Read-only aggregation of the queue contents
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub total_count: usize,
    pub count_by_priority: BTreeMap<i32, usize>,
    pub count_by_kind: BTreeMap<TaskKind, usize>,
    /// Queued tasks in insertion order
    pub snapshot: Vec<Task>,
}

/// Dispatch order: higher priority first, then earliest inserted first.
///
/// Returns `Ordering::Greater` when `a` should be dispatched before `b`.
pub fn dispatch_order(a: &Task, b: &Task) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.sequence.cmp(&a.sequence))
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new queued task and return its id
    pub fn enqueue(&mut self, request: TaskRequest) -> TaskId {
        let task = Task::new(request, self.next_sequence);
        self.next_sequence += 1;

        let task_id = task.id;
        info!(
            "Added task: {} (ID: {}, priority: {}, source: {})",
            task.name, task_id, task.priority, task.trigger_source
        );
        self.tasks.push(task);
        task_id
    }

    /// Remove the next task in dispatch order and mark it dispatched
    pub fn pop_next(&mut self) -> Option<Task> {
        let index = self
            .tasks
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| dispatch_order(a, b))
            .map(|(index, _)| index)?;

        let mut task = self.tasks.remove(index);
        task.status = TaskStatus::Dispatched;

        info!("Dispatching task: {} (Priority: {})", task.name, task.priority);
        debug!("{} tasks remain queued", self.tasks.len());
        Some(task)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Aggregate counts without touching queue order
    pub fn status(&self) -> QueueStatus {
        let mut count_by_priority = BTreeMap::new();
        let mut count_by_kind = BTreeMap::new();

        for task in &self.tasks {
            *count_by_priority.entry(task.priority).or_insert(0) += 1;
            *count_by_kind.entry(task.kind).or_insert(0) += 1;
        }

        QueueStatus {
            total_count: self.tasks.len(),
            count_by_priority,
            count_by_kind,
            snapshot: self.tasks.clone(),
        }
    }
}
