//! # Execution Engine
//!
//! Single owner of the task queue and the executor (and with it the
//! execution history). Triggers come in through the router surfaces, units
//! are resolved and run through the dispatcher, and reporting reads the
//! queue status and execution statistics.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 ExecutionEngine                  │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  │
//! │  │ TaskRouter │→ │ TaskQueue  │→ │ Dispatcher │  │
//! │  └────────────┘  └────────────┘  └─────┬──────┘  │
//! │                                        ↓         │
//! │                   UnitRegistry ← TaskExecutor    │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use autobrain::{EngineConfig, ExecutionEngine, StaticRegistry, UnitCatalog};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = ExecutionEngine::new(
//!         EngineConfig::for_project("."),
//!         Arc::new(StaticRegistry::new()),
//!         UnitCatalog::new(),
//!     );
//!
//!     engine.route_by_goal("maintain", None).await;
//!     let report = engine.dispatch_cycle().await;
//!     println!("{} tasks executed", report.executed.len());
//! }
//! ```

use crate::config::EngineConfig;
use crate::dispatch::{DispatchReport, Dispatcher, UndispatchableTask};
use crate::executor::{
    ExecutionHistoryEntry, ExecutionResult, ExecutionStats, RetryPolicy, TaskExecutor, UnitCatalog,
};
use crate::registry::{JsonRegistry, UnitDescriptor, UnitRegistry};
use crate::task::{QueueStatus, RouteOutcome, Task, TaskId, TaskQueue, TaskRequest, TaskRouter};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub struct ExecutionEngine {
    config: EngineConfig,
    queue: Arc<Mutex<TaskQueue>>,
    router: TaskRouter,
    executor: Arc<TaskExecutor>,
    dispatcher: Dispatcher,
}

impl ExecutionEngine {
    pub fn new(
        config: EngineConfig,
        registry: Arc<dyn UnitRegistry>,
        catalog: UnitCatalog,
    ) -> Self {
        let config = config.with_absolute_root();
        let queue = Arc::new(Mutex::new(TaskQueue::new()));
        let router = TaskRouter::new(config.routing_table());
        let executor = Arc::new(TaskExecutor::new(config.executor_config(), catalog));
        let dispatcher = Dispatcher::new(
            queue.clone(),
            registry,
            config.scripts_dir_path(),
            executor.clone(),
        );

        info!(
            "Execution engine initialized (project root: {:?})",
            config.project_root
        );

        Self {
            config,
            queue,
            router,
            executor,
            dispatcher,
        }
    }

    /// Build an engine whose registry is loaded from the configured registry file
    pub fn from_config(config: EngineConfig, catalog: UnitCatalog) -> Self {
        let registry = JsonRegistry::load_or_empty(config.registry_file_path());
        Self::new(config, Arc::new(registry), catalog)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn router(&self) -> &TaskRouter {
        &self.router
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    pub async fn enqueue(&self, request: TaskRequest) -> TaskId {
        self.queue.lock().await.enqueue(request)
    }

    pub async fn route_trigger(
        &self,
        trigger: &str,
        args: &[String],
        origin_id: Option<&str>,
    ) -> RouteOutcome {
        let mut queue = self.queue.lock().await;
        self.router.route_trigger(&mut queue, trigger, args, origin_id)
    }

    pub async fn route_by_schedule(&self, period: &str) -> RouteOutcome {
        let mut queue = self.queue.lock().await;
        self.router.route_by_schedule(&mut queue, period)
    }

    pub async fn route_by_goal(&self, goal: &str, context: Option<&str>) -> RouteOutcome {
        let mut queue = self.queue.lock().await;
        self.router.route_by_goal(&mut queue, goal, context)
    }

    pub fn resolve_unit(&self, name: &str) -> Option<UnitDescriptor> {
        self.dispatcher.resolve_unit(name)
    }

    /// Pop and run up to `max_count` tasks
    pub async fn dispatch(&self, max_count: usize) -> DispatchReport {
        self.dispatcher.dispatch(max_count).await
    }

    /// Dispatch using the configured per-cycle limit
    pub async fn dispatch_cycle(&self) -> DispatchReport {
        self.dispatch(self.config.dispatch.max_per_cycle).await
    }

    /// Pop up to `max_count` resolvable tasks without running them
    pub async fn take_ready(&self, max_count: usize) -> (Vec<Task>, Vec<UndispatchableTask>) {
        self.dispatcher.take_ready(max_count).await
    }

    /// Run one already-resolved task
    pub async fn run(&self, task: Task) -> ExecutionResult {
        self.executor.run(task).await
    }

    pub async fn execute_batch(&self, tasks: Vec<Task>) -> Vec<ExecutionResult> {
        self.executor.execute_batch(tasks).await
    }

    pub async fn run_with_retry(&self, task: Task, policy: &RetryPolicy) -> Vec<ExecutionResult> {
        self.executor.run_with_retry(task, policy).await
    }

    pub async fn queue_status(&self) -> QueueStatus {
        self.queue.lock().await.status()
    }

    pub async fn execution_stats(&self) -> ExecutionStats {
        self.executor.execution_stats().await
    }

    pub async fn history(&self) -> Vec<ExecutionHistoryEntry> {
        self.executor.history().await
    }
}
