use crate::task::queue::TaskQueue;
use crate::task::types::*;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Translates triggers into task insertions using static tables
#[derive(Debug, Clone, Default)]
pub struct TaskRouter {
    table: RoutingTable,
}

/// Trigger, schedule and goal tables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingTable {
    #[serde(default)]
    pub triggers: BTreeMap<String, TriggerRoute>,
    #[serde(default)]
    pub schedules: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub goals: BTreeMap<String, GoalRoute>,
}

/// A single trigger mapped onto one unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerRoute {
    pub unit: String,
    pub kind: TaskKind,
    pub priority: i32,
}

/// A goal mapped onto a fixed list of AI-type units
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalRoute {
    pub tasks: Vec<String>,
    pub priority: i32,
}

/// Result of routing a trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Tasks were enqueued, in insertion order
    Routed(Vec<TaskId>),
    /// The key is not in the table; nothing was enqueued
    Unrecognized(String),
}

impl RouteOutcome {
    pub fn task_ids(&self) -> &[TaskId] {
        match self {
            RouteOutcome::Routed(ids) => ids,
            RouteOutcome::Unrecognized(_) => &[],
        }
    }

    pub fn is_routed(&self) -> bool {
        matches!(self, RouteOutcome::Routed(_))
    }
}

impl TaskRouter {
    pub fn new(table: RoutingTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Route an external command trigger onto exactly one task
    pub fn route_trigger(
        &self,
        queue: &mut TaskQueue,
        trigger: &str,
        args: &[String],
        origin_id: Option<&str>,
    ) -> RouteOutcome {
        let Some(route) = self.table.triggers.get(trigger) else {
            warn!("Unrecognized trigger: {}", trigger);
            return RouteOutcome::Unrecognized(trigger.to_string());
        };

        let request = TaskRequest::new(&route.unit)
            .with_kind(route.kind)
            .with_priority(route.priority)
            .with_trigger(TriggerSource::Command(trigger.to_string()))
            .with_metadata_entry("command", trigger)
            .with_metadata_entry("args", args.to_vec())
            .with_metadata_entry("origin_id", origin_id.map(str::to_string))
            .with_metadata_entry("timestamp", Utc::now().to_rfc3339());

        let task_id = queue.enqueue(request);
        info!("Routed trigger '{}' to task {}", trigger, task_id);
        RouteOutcome::Routed(vec![task_id])
    }

    /// Enqueue the maintenance tasks for a schedule period at low priority
    pub fn route_by_schedule(&self, queue: &mut TaskQueue, period: &str) -> RouteOutcome {
        let Some(units) = self.table.schedules.get(period) else {
            warn!("Unrecognized schedule period: {}", period);
            return RouteOutcome::Unrecognized(period.to_string());
        };

        let task_ids: Vec<TaskId> = units
            .iter()
            .map(|unit| {
                queue.enqueue(
                    TaskRequest::new(unit)
                        .with_kind(TaskKind::Maintenance)
                        .with_priority(TaskPriority::Low)
                        .with_trigger(TriggerSource::Schedule(period.to_string())),
                )
            })
            .collect();

        info!("Added {} scheduled tasks ({})", task_ids.len(), period);
        RouteOutcome::Routed(task_ids)
    }

    /// Enqueue the AI tasks for a goal at the goal's priority
    pub fn route_by_goal(
        &self,
        queue: &mut TaskQueue,
        goal: &str,
        context: Option<&str>,
    ) -> RouteOutcome {
        let Some(route) = self.table.goals.get(goal) else {
            warn!("Unrecognized goal: {}", goal);
            return RouteOutcome::Unrecognized(goal.to_string());
        };

        let task_ids: Vec<TaskId> = route
            .tasks
            .iter()
            .map(|unit| {
                queue.enqueue(
                    TaskRequest::new(unit)
                        .with_kind(TaskKind::Ai)
                        .with_priority(route.priority)
                        .with_trigger(TriggerSource::Goal(goal.to_string()))
                        .with_metadata_entry("goal", goal)
                        .with_metadata_entry("context", context.map(str::to_string))
                        .with_metadata_entry("auto_generated", true),
                )
            })
            .collect();

        info!("Routed {} tasks for goal: {}", task_ids.len(), goal);
        RouteOutcome::Routed(task_ids)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        let trigger = |unit: &str, kind: TaskKind, priority: TaskPriority| TriggerRoute {
            unit: unit.to_string(),
            kind,
            priority: priority.value(),
        };
        let units = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        let goal = |names: &[&str], priority: TaskPriority| GoalRoute {
            tasks: units(names),
            priority: priority.value(),
        };

        let triggers = BTreeMap::from([
            (
                "teach".to_string(),
                trigger("learning_module", TaskKind::Learning, TaskPriority::High),
            ),
            (
                "flush".to_string(),
                trigger("memory_flush", TaskKind::Maintenance, TaskPriority::Normal),
            ),
            (
                "goal".to_string(),
                trigger("goal_setter", TaskKind::Ai, TaskPriority::High),
            ),
            (
                "mode".to_string(),
                trigger("mode_switcher", TaskKind::Utility, TaskPriority::Normal),
            ),
            (
                "status".to_string(),
                trigger("status_report", TaskKind::Utility, TaskPriority::Low),
            ),
            (
                "analyze".to_string(),
                trigger("data_analyzer", TaskKind::Data, TaskPriority::Normal),
            ),
        ]);

        let schedules = BTreeMap::from([
            ("hourly".to_string(), units(&["data_collector", "health_check"])),
            ("daily".to_string(), units(&["log_rotator", "backup_manager"])),
            ("weekly".to_string(), units(&["deep_analysis", "model_training"])),
            (
                "monthly".to_string(),
                units(&["full_backup", "performance_review"]),
            ),
        ]);

        let goals = BTreeMap::from([
            (
                "learn".to_string(),
                goal(
                    &["data_collector", "pattern_analyzer", "knowledge_updater"],
                    TaskPriority::High,
                ),
            ),
            (
                "optimize".to_string(),
                goal(
                    &["performance_analyzer", "code_optimizer", "efficiency_checker"],
                    TaskPriority::Normal,
                ),
            ),
            (
                "maintain".to_string(),
                goal(
                    &["health_check", "cleanup_old_files", "update_configs"],
                    TaskPriority::Low,
                ),
            ),
            (
                "evolve".to_string(),
                goal(
                    &["self_modifier", "capability_enhancer", "architecture_updater"],
                    TaskPriority::Urgent,
                ),
            ),
        ]);

        Self {
            triggers,
            schedules,
            goals,
        }
    }
}
