use super::ExecutionResult;
use crate::task::Task;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Task snapshot paired with the outcome of its run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionHistoryEntry {
    pub task: Task,
    pub result: ExecutionResult,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate statistics over the retained history
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExecutionStats {
    pub total_executions: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub success_rate_percent: f64,
    pub average_duration_seconds: f64,
}

/// Append-only log that drops its oldest entries past `capacity`
#[derive(Debug)]
pub struct ExecutionHistory {
    entries: VecDeque<ExecutionHistoryEntry>,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, task: Task, result: ExecutionResult) {
        self.entries.push_back(ExecutionHistoryEntry {
            task,
            result,
            recorded_at: Utc::now(),
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first
    pub fn entries(&self) -> impl Iterator<Item = &ExecutionHistoryEntry> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<ExecutionHistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn stats(&self) -> ExecutionStats {
        let total = self.entries.len();
        if total == 0 {
            return ExecutionStats::default();
        }

        let success_count = self.entries.iter().filter(|e| e.result.success).count();
        let total_duration: f64 = self
            .entries
            .iter()
            .map(|e| e.result.duration_seconds)
            .sum();

        ExecutionStats {
            total_executions: total,
            success_count,
            failure_count: total - success_count,
            success_rate_percent: success_count as f64 / total as f64 * 100.0,
            average_duration_seconds: total_duration / total as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskRequest;

    fn record_run(
        history: &mut ExecutionHistory,
        name: &str,
        success: bool,
        duration: f64,
    ) -> Task {
        let task = Task::new(TaskRequest::new(name), 0);
        let result = ExecutionResult {
            task_id: task.id,
            success,
            output: String::new(),
            error: if success { String::new() } else { "failed".to_string() },
            error_kind: None,
            duration_seconds: duration,
            timestamp: Utc::now(),
        };
        history.record(task.clone(), result);
        task
    }

    #[test]
    fn test_empty_history_stats() {
        let history = ExecutionHistory::new(10);
        assert_eq!(history.stats(), ExecutionStats::default());
        assert_eq!(history.stats().total_executions, 0);
    }

    #[test]
    fn test_stats_aggregation() {
        let mut history = ExecutionHistory::new(10);
        record_run(&mut history, "a", true, 1.0);
        record_run(&mut history, "b", true, 2.0);
        record_run(&mut history, "c", false, 3.0);
        record_run(&mut history, "d", false, 6.0);

        let stats = history.stats();
        assert_eq!(stats.total_executions, 4);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 2);
        assert!((stats.success_rate_percent - 50.0).abs() < f64::EPSILON);
        assert!((stats.average_duration_seconds - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let capacity = 5;
        let mut history = ExecutionHistory::new(capacity);

        let first = record_run(&mut history, "task_0", true, 0.1);
        for i in 1..capacity {
            record_run(&mut history, &format!("task_{}", i), true, 0.1);
        }
        assert_eq!(history.len(), capacity);
        assert_eq!(history.entries().next().unwrap().task.id, first.id);

        // Entry N+1 evicts entry 1
        let newest = record_run(&mut history, "task_overflow", false, 0.1);
        assert_eq!(history.len(), capacity);
        assert!(history.entries().all(|e| e.task.id != first.id));
        assert_eq!(history.entries().next().unwrap().task.name, "task_1");
        assert_eq!(history.entries().last().unwrap().task.id, newest.id);
    }

    #[test]
    fn test_history_never_exceeds_capacity() {
        let mut history = ExecutionHistory::new(100);
        for i in 0..250 {
            record_run(&mut history, &format!("task_{}", i), i % 3 != 0, 0.5);
            assert!(history.len() <= 100);
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.entries().next().unwrap().task.name, "task_150");
    }
}
