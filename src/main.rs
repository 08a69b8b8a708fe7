use anyhow::{Context, Result};
use autobrain::cli::{Args, ExecutionMode};
use autobrain::config::{ConfigDiscovery, EngineConfig, LoggingSettings};
use autobrain::env;
use autobrain::executor::{UnitCatalog, UnitFault, entry_point};
use autobrain::{ExecutionEngine, TaskRequest};
use serde_json::json;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let config = ConfigDiscovery::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&config.logging, &config.logs_dir_path(), args.verbose)?;
    info!("Starting autobrain");

    match mode {
        ExecutionMode::Test { unit } => run_test(config, &unit).await,
        ExecutionMode::Stats => show_stats(config).await,
        ExecutionMode::RouteTest { dispatch } => run_route_test(config, dispatch).await,
        ExecutionMode::ShowConfig => show_config(&config),
    }
}

fn init_tracing(logging: &LoggingSettings, logs_dir: &Path, verbose: bool) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ if verbose => EnvFilter::try_new("debug")?,
        _ => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("Invalid log level '{}'", logging.level))?,
    };

    let mut maybe_writer = None;
    if logging.file {
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create log directory {:?}", logs_dir))?;
        let appender = tracing_appender::rolling::daily(logs_dir, env::APP_LOG_FILE_PREFIX);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// In-process units shipped with the binary
fn builtin_catalog() -> UnitCatalog {
    UnitCatalog::new().with_entry(
        "builtin::heartbeat",
        entry_point(|ctx| {
            if ctx.is_cancelled() {
                return Err(UnitFault::new("Cancelled", "heartbeat cancelled"));
            }
            ctx.emit(&format!("heartbeat from {}\n", ctx.task().name));
            Ok(Some(json!({ "alive": true, "task_id": ctx.task().id })))
        }),
    )
}

fn build_engine(config: EngineConfig) -> ExecutionEngine {
    ExecutionEngine::from_config(config, builtin_catalog())
}

async fn run_test(config: EngineConfig, unit: &str) -> Result<()> {
    let engine = build_engine(config);

    engine
        .enqueue(TaskRequest::new(unit).with_metadata_entry("test", true))
        .await;
    let report = engine.dispatch(1).await;

    for skipped in &report.undispatchable {
        println!("✗ {}: {}", skipped.name, skipped.reason);
    }
    for result in &report.executed {
        println!("Task ID:  {}", result.task_id);
        println!("Success:  {}", result.success);
        println!("Duration: {:.2}s", result.duration_seconds);
        if !result.output.is_empty() {
            println!("Output:\n{}", result.output.trim_end());
        }
        if !result.error.is_empty() {
            println!("Error:\n{}", result.error);
        }
    }

    if report.success_count() == 1 {
        Ok(())
    } else {
        error!("Test run of '{}' did not succeed", unit);
        std::process::exit(1);
    }
}

async fn show_stats(config: EngineConfig) -> Result<()> {
    let engine = build_engine(config);
    let stats = engine.execution_stats().await;

    println!("total_executions: {}", stats.total_executions);
    println!("success_count: {}", stats.success_count);
    println!("failure_count: {}", stats.failure_count);
    println!("success_rate_percent: {:.1}", stats.success_rate_percent);
    println!(
        "average_duration_seconds: {:.2}",
        stats.average_duration_seconds
    );
    Ok(())
}

async fn run_route_test(config: EngineConfig, dispatch: Option<usize>) -> Result<()> {
    let engine = build_engine(config);

    engine
        .route_trigger("teach", &["rust".to_string()], Some("route-test"))
        .await;
    engine.route_by_goal("learn", Some("route-test")).await;
    engine.route_by_schedule("hourly").await;

    let status = engine.queue_status().await;
    println!(
        "{}",
        serde_json::to_string_pretty(&status).context("Failed to render queue status")?
    );

    if let Some(max_count) = dispatch {
        let report = engine.dispatch(max_count).await;
        println!(
            "Dispatched {} tasks ({} succeeded, {} undispatchable)",
            report.dispatched_count(),
            report.success_count(),
            report.undispatchable.len()
        );
        for result in &report.executed {
            let mark = if result.success { "✓" } else { "✗" };
            println!(
                "  {} {} {:.2}s {}",
                mark, result.task_id, result.duration_seconds, result.error
            );
        }
    }

    Ok(())
}

fn show_config(config: &EngineConfig) -> Result<()> {
    println!("Configuration Discovery Hierarchy:");
    println!();

    for (i, candidate) in ConfigDiscovery::config_candidates().iter().enumerate() {
        let status = if candidate.exists() {
            if candidate.is_file() {
                "✓ EXISTS"
            } else {
                "✗ NOT A FILE"
            }
        } else {
            "✗ NOT FOUND"
        };
        println!("  {}. {:?} - {}", i + 1, candidate, status);
    }

    println!();
    match ConfigDiscovery::find_config_file() {
        Some(found) => println!("Discovered configuration: {:?}", found),
        None => println!("Discovered configuration: Built-in defaults"),
    }
    println!();
    println!("Active configuration:");
    println!("{}", config.to_toml_string()?);
    Ok(())
}
