//! # Autobrain
//!
//! Core of a self-hosted automation agent: external triggers become
//! prioritized tasks, tasks are resolved to executable units, and units run
//! under a wall-clock budget with their outcomes recorded.
//!
//! ## Architecture Overview
//!
//! - **[`task`]**: task model, priority queue and trigger router
//! - **[`registry`]**: task name to executable unit resolution
//! - **[`dispatch`]**: pops, resolves and hands tasks to the executor
//! - **[`executor`]**: bounded execution, history, statistics and run logs
//! - **[`engine`]**: single owner tying the pieces together
//! - **[`config`]**: TOML configuration and discovery
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use autobrain::{EngineConfig, ExecutionEngine, UnitCatalog};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = ExecutionEngine::from_config(EngineConfig::default(), UnitCatalog::new());
//!
//!     engine.route_trigger("status", &[], None).await;
//!     let report = engine.dispatch(1).await;
//!     for result in report.executed {
//!         println!("{} -> {}", result.task_id, result.success);
//!     }
//! }
//! ```

/// Task model, priority queue and routing tables.
pub mod task;

/// Unit descriptors and registries.
pub mod registry;

/// Queue-to-executor dispatch.
pub mod dispatch;

/// Bounded task execution.
pub mod executor;

/// Engine orchestration.
pub mod engine;

/// Configuration model and discovery.
pub mod config;

/// Environment constants and path utilities.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use config::{ConfigDiscovery, ConfigError, EngineConfig};
pub use dispatch::{DispatchReport, Dispatcher, UndispatchableTask};
pub use engine::ExecutionEngine;
pub use executor::{
    ExecutionResult, ExecutionStats, ExecutorConfig, FailureKind, RetryPolicy, TaskExecutor,
    UnitCatalog, UnitError,
};
pub use registry::{JsonRegistry, StaticRegistry, UnitDescriptor, UnitKind, UnitRegistry};
pub use task::{
    QueueStatus, RouteOutcome, RoutingTable, Task, TaskId, TaskKind, TaskPriority, TaskQueue,
    TaskRequest, TaskRouter, TaskStatus,
};
