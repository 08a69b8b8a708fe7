//! In-process units.
//!
//! A unit is "loaded" by looking its descriptor location up in a
//! [`UnitCatalog`]. The entry point runs on its own named thread so the
//! dispatching task is never occupied past the budget; a [`TimeoutWatcher`]
//! raises the unit's [`CancelFlag`] when the budget elapses.

use super::{DEFAULT_SUCCESS_OUTPUT, UnitError, UnitRun};
use crate::registry::UnitDescriptor;
use crate::task::Task;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Fault raised by an entry point, classified by kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct UnitFault {
    pub kind: String,
    pub message: String,
}

impl UnitFault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Designated entry point of an in-process unit
pub trait EntryPoint: Send + Sync {
    /// Whether the entry point takes the task context
    fn accepts_context(&self) -> bool {
        true
    }

    /// Invoke the unit. Blocking; runs on a dedicated thread.
    fn call(&self, context: Option<&UnitContext>) -> Result<Option<Value>, UnitFault>;
}

/// Cooperative cancellation signal raised by the timeout watcher
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context handed to entry points that accept it
#[derive(Debug, Clone)]
pub struct UnitContext {
    task: Task,
    cancel: CancelFlag,
    output: Arc<Mutex<String>>,
}

impl UnitContext {
    pub fn new(task: Task, cancel: CancelFlag) -> Self {
        Self {
            task,
            cancel,
            output: Arc::default(),
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Append to the captured output. Kept even if the unit later fails.
    pub fn emit(&self, text: &str) {
        let mut output = self.output.lock().unwrap_or_else(|p| p.into_inner());
        output.push_str(text);
    }

    fn captured(&self) -> String {
        self.output
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

/// Named in-process entry points
#[derive(Clone, Default)]
pub struct UnitCatalog {
    entries: HashMap<String, Arc<dyn EntryPoint>>,
}

impl UnitCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, entry: Arc<dyn EntryPoint>) {
        self.entries.insert(name.into(), entry);
    }

    pub fn with_entry(mut self, name: impl Into<String>, entry: Arc<dyn EntryPoint>) -> Self {
        self.register(name, entry);
        self
    }

    pub fn load(&self, name: &str) -> Option<Arc<dyn EntryPoint>> {
        self.entries.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for UnitCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitCatalog")
            .field("entries", &self.names())
            .finish()
    }
}

struct ContextEntryPoint<F>(F);

impl<F> EntryPoint for ContextEntryPoint<F>
where
    F: Fn(&UnitContext) -> Result<Option<Value>, UnitFault> + Send + Sync,
{
    fn call(&self, context: Option<&UnitContext>) -> Result<Option<Value>, UnitFault> {
        match context {
            Some(context) => (self.0)(context),
            None => Err(UnitFault::new("TypeError", "entry point requires a task context")),
        }
    }
}

struct BareEntryPoint<F>(F);

impl<F> EntryPoint for BareEntryPoint<F>
where
    F: Fn() -> Result<Option<Value>, UnitFault> + Send + Sync,
{
    fn accepts_context(&self) -> bool {
        false
    }

    fn call(&self, _context: Option<&UnitContext>) -> Result<Option<Value>, UnitFault> {
        (self.0)()
    }
}

/// Entry point from a closure taking the task context
pub fn entry_point<F>(f: F) -> Arc<dyn EntryPoint>
where
    F: Fn(&UnitContext) -> Result<Option<Value>, UnitFault> + Send + Sync + 'static,
{
    Arc::new(ContextEntryPoint(f))
}

/// Entry point from a closure invoked with no arguments
pub fn entry_point_without_context<F>(f: F) -> Arc<dyn EntryPoint>
where
    F: Fn() -> Result<Option<Value>, UnitFault> + Send + Sync + 'static,
{
    Arc::new(BareEntryPoint(f))
}

/// Background watcher that raises a cancel flag once the budget elapses.
///
/// It only signals; it never stops the watched work.
pub struct TimeoutWatcher {
    handle: JoinHandle<()>,
}

impl TimeoutWatcher {
    pub fn arm(budget: Duration, flag: CancelFlag) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            flag.cancel();
            warn!(
                "Execution timeout after {:.2} seconds",
                budget.as_secs_f64()
            );
        });
        Self { handle }
    }

    /// Resolves once the watcher has fired
    pub async fn fired(&mut self) {
        let _ = (&mut self.handle).await;
    }

    pub fn disarm(&self) {
        self.handle.abort();
    }
}

impl Drop for TimeoutWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(crate) async fn run_unit(
    catalog: &UnitCatalog,
    unit: &UnitDescriptor,
    task: &Task,
    timeout: Duration,
) -> UnitRun {
    let Some(entry) = catalog.load(&unit.location) else {
        return UnitRun::failed(
            String::new(),
            UnitError::NotFound(format!(
                "in-process unit '{}' is not registered",
                unit.location
            )),
        );
    };

    debug!("Executing in-process unit: {}", unit.location);

    let cancel = CancelFlag::new();
    let context = UnitContext::new(task.clone(), cancel.clone());
    let observer = context.clone();
    let (tx, rx) = oneshot::channel();

    let spawned = std::thread::Builder::new()
        .name(format!("unit-{}", unit.name))
        .spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                if entry.accepts_context() {
                    entry.call(Some(&context))
                } else {
                    entry.call(None)
                }
            }))
            .unwrap_or_else(|payload| Err(UnitFault::new("panic", panic_message(payload))));
            let _ = tx.send(outcome);
        });

    if let Err(e) = spawned {
        return UnitRun::failed(
            String::new(),
            UnitError::Fault(UnitFault::new("spawn", e.to_string())),
        );
    }

    let mut watcher = TimeoutWatcher::arm(timeout, cancel);
    let run = tokio::select! {
        biased;
        received = rx => match received {
            Ok(Ok(value)) => UnitRun::succeeded(render_output(value, observer.captured())),
            Ok(Err(fault)) => UnitRun::failed(observer.captured(), UnitError::Fault(fault)),
            Err(_) => UnitRun::failed(
                observer.captured(),
                UnitError::Fault(UnitFault::new("internal", "unit thread exited without a result")),
            ),
        },
        _ = watcher.fired() => {
            UnitRun::failed(observer.captured(), UnitError::Timeout(timeout))
        }
    };
    watcher.disarm();

    run
}

fn render_output(value: Option<Value>, captured: String) -> String {
    match value {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None if !captured.is_empty() => captured,
        Some(Value::Null) | None => DEFAULT_SUCCESS_OUTPUT.to_string(),
        Some(other) => other.to_string(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unit panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskRequest;
    use serde_json::json;
    use std::time::Instant;

    fn task_for(unit: &UnitDescriptor) -> Task {
        let mut task = Task::new(TaskRequest::new(&unit.name), 0);
        task.unit = Some(unit.clone());
        task
    }

    #[tokio::test]
    async fn test_entry_point_receives_context() {
        let catalog = UnitCatalog::new().with_entry(
            "echo_name",
            entry_point(|ctx| Ok(Some(json!(format!("hello {}", ctx.task().name))))),
        );
        let unit = UnitDescriptor::in_process("greeter", "echo_name");

        let run = run_unit(&catalog, &unit, &task_for(&unit), Duration::from_secs(5)).await;
        assert!(run.error.is_none());
        assert_eq!(run.output, "hello greeter");
    }

    #[tokio::test]
    async fn test_entry_point_without_context() {
        let catalog = UnitCatalog::new().with_entry(
            "counter",
            entry_point_without_context(|| Ok(Some(json!({"count": 3})))),
        );
        let unit = UnitDescriptor::in_process("counter", "counter");

        let run = run_unit(&catalog, &unit, &task_for(&unit), Duration::from_secs(5)).await;
        assert!(run.error.is_none());
        assert_eq!(run.output, r#"{"count":3}"#);
    }

    #[tokio::test]
    async fn test_no_return_value_uses_default_output() {
        let catalog =
            UnitCatalog::new().with_entry("noop", entry_point_without_context(|| Ok(None)));
        let unit = UnitDescriptor::in_process("noop", "noop");

        let run = run_unit(&catalog, &unit, &task_for(&unit), Duration::from_secs(5)).await;
        assert_eq!(run.output, DEFAULT_SUCCESS_OUTPUT);
    }

    #[tokio::test]
    async fn test_unregistered_entry_point() {
        let catalog = UnitCatalog::new();
        let unit = UnitDescriptor::in_process("ghost", "ghost");

        let run = run_unit(&catalog, &unit, &task_for(&unit), Duration::from_secs(5)).await;
        assert!(matches!(run.error, Some(UnitError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fault_keeps_partial_output() {
        let catalog = UnitCatalog::new().with_entry(
            "flaky",
            entry_point(|ctx| {
                ctx.emit("step 1 done\n");
                Err(UnitFault::new("ValueError", "bad input"))
            }),
        );
        let unit = UnitDescriptor::in_process("flaky", "flaky");

        let run = run_unit(&catalog, &unit, &task_for(&unit), Duration::from_secs(5)).await;
        assert_eq!(run.output, "step 1 done\n");
        let error = run.error.unwrap();
        assert_eq!(error.to_string(), "ValueError: bad input");
    }

    #[tokio::test]
    async fn test_panic_is_classified_as_fault() {
        let catalog = UnitCatalog::new().with_entry(
            "boom",
            entry_point_without_context(|| panic!("exploded")),
        );
        let unit = UnitDescriptor::in_process("boom", "boom");

        let run = run_unit(&catalog, &unit, &task_for(&unit), Duration::from_secs(5)).await;
        match run.error {
            Some(UnitError::Fault(fault)) => {
                assert_eq!(fault.kind, "panic");
                assert!(fault.message.contains("exploded"));
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_watcher_fires_before_unit_stops() {
        let finished = Arc::new(AtomicBool::new(false));
        let finished_in_unit = finished.clone();
        let catalog = UnitCatalog::new().with_entry(
            "stubborn",
            entry_point_without_context(move || {
                std::thread::sleep(Duration::from_millis(800));
                finished_in_unit.store(true, Ordering::SeqCst);
                Ok(None)
            }),
        );
        let unit = UnitDescriptor::in_process("stubborn", "stubborn");

        let start = Instant::now();
        let run = run_unit(&catalog, &unit, &task_for(&unit), Duration::from_millis(150)).await;
        let elapsed = start.elapsed();

        assert!(matches!(run.error, Some(UnitError::Timeout(_))));
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_millis(650));
        // The caller was released; the unit itself is still running
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cooperative_unit_observes_cancel_flag() {
        let observed = Arc::new(AtomicBool::new(false));
        let observed_in_unit = observed.clone();
        let catalog = UnitCatalog::new().with_entry(
            "polite",
            entry_point(move |ctx| {
                let deadline = std::time::Instant::now() + Duration::from_secs(5);
                while std::time::Instant::now() < deadline {
                    if ctx.is_cancelled() {
                        observed_in_unit.store(true, Ordering::SeqCst);
                        return Err(UnitFault::new("Cancelled", "stopped on request"));
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Ok(None)
            }),
        );
        let unit = UnitDescriptor::in_process("polite", "polite");

        let run = run_unit(&catalog, &unit, &task_for(&unit), Duration::from_millis(100)).await;
        assert!(matches!(run.error, Some(UnitError::Timeout(_))));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(observed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
