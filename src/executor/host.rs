//! External-process units.
//!
//! Runs the unit's executable as a child process using
//! `tokio::process::Command`. Output is pumped into shared buffers while the
//! child runs so partial stdout survives a timeout; on timeout the child is
//! killed.

use super::in_process::UnitFault;
use super::{UnitError, UnitRun};
use crate::registry::UnitDescriptor;
use crate::task::Task;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Environment variable carrying the task id
pub const TASK_ID_ENV: &str = "AUTOBRAIN_TASK_ID";
/// Environment variable carrying the task name
pub const TASK_NAME_ENV: &str = "AUTOBRAIN_TASK_NAME";
/// Environment variable carrying the task metadata as JSON
pub const TASK_METADATA_ENV: &str = "AUTOBRAIN_TASK_METADATA";

/// How long to keep draining pipes once the child is gone
const KILLED_DRAIN_GRACE: Duration = Duration::from_millis(250);
const EXITED_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// "Text file busy"
const ETXTBSY: i32 = 26;
const SPAWN_BUSY_RETRIES: u32 = 5;

/// Locate the executable for a unit location.
///
/// Relative paths are resolved against `working_dir` and returned absolute;
/// bare command names fall back to a `PATH` lookup.
pub fn resolve_program(location: &str, working_dir: &Path) -> Option<PathBuf> {
    let path = Path::new(location);
    let candidate = if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    };

    if candidate.is_file() {
        // The child runs in `working_dir`; a relative program path would resolve twice
        return Some(std::path::absolute(&candidate).unwrap_or(candidate));
    }

    if path.components().count() == 1 {
        return which::which(location).ok();
    }

    None
}

pub(crate) async fn run_unit(
    unit: &UnitDescriptor,
    task: &Task,
    timeout: Duration,
    working_dir: &Path,
) -> UnitRun {
    let Some(program) = resolve_program(&unit.location, working_dir) else {
        return UnitRun::failed(
            String::new(),
            UnitError::NotFound(format!("executable '{}' does not exist", unit.location)),
        );
    };

    debug!("Executing subprocess: {:?}", program);

    let metadata = serde_json::Value::Object(task.metadata.clone()).to_string();
    let mut command = Command::new(&program);
    command
        .current_dir(working_dir)
        .env(TASK_ID_ENV, task.id.to_string())
        .env(TASK_NAME_ENV, &task.name)
        .env(TASK_METADATA_ENV, metadata)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match spawn(&mut command).await {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return UnitRun::failed(
                String::new(),
                UnitError::NotFound(format!("{}: {}", program.display(), e)),
            );
        }
        Err(e) => {
            return UnitRun::failed(
                String::new(),
                UnitError::Fault(UnitFault::new(
                    "SpawnError",
                    format!("Subprocess execution failed: {}", e),
                )),
            );
        }
    };

    let stdout = OutputPump::start(child.stdout.take());
    let stderr = OutputPump::start(child.stderr.take());

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let output = stdout.finish(EXITED_DRAIN_GRACE).await;
            let errors = stderr.finish(EXITED_DRAIN_GRACE).await;
            if status.success() {
                UnitRun::succeeded(output)
            } else {
                UnitRun::failed(
                    output,
                    UnitError::NonZeroExit {
                        code: status.code().unwrap_or(-1),
                        stderr: errors.trim().to_string(),
                    },
                )
            }
        }
        Ok(Err(e)) => {
            let output = stdout.finish(KILLED_DRAIN_GRACE).await;
            UnitRun::failed(
                output,
                UnitError::Fault(UnitFault::new("WaitError", e.to_string())),
            )
        }
        Err(_) => {
            warn!(
                "Subprocess timed out after {:.2} seconds, killing {:?}",
                timeout.as_secs_f64(),
                program
            );
            if let Err(e) = child.kill().await {
                warn!("Failed to kill timed out subprocess: {}", e);
            }
            let output = stdout.finish(KILLED_DRAIN_GRACE).await;
            UnitRun::failed(output, UnitError::Timeout(timeout))
        }
    }
}

/// Spawn, retrying briefly while the executable is still open for writing
async fn spawn(command: &mut Command) -> std::io::Result<tokio::process::Child> {
    let mut attempts = 0;
    loop {
        match command.spawn() {
            Err(e) if e.raw_os_error() == Some(ETXTBSY) && attempts < SPAWN_BUSY_RETRIES => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            other => return other,
        }
    }
}

/// Copies a child pipe into a shared buffer until EOF
struct OutputPump {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: Option<JoinHandle<()>>,
}

impl OutputPump {
    fn start<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let handle = reader.map(|mut reader| {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 4096];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buffer.lock().await.extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });

        Self { buffer, handle }
    }

    /// Wait up to `grace` for EOF, then return whatever was captured
    async fn finish(mut self, grace: Duration) -> String {
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                // A grandchild may still hold the pipe open
                handle.abort();
            }
        }
        let bytes = self.buffer.lock().await;
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
