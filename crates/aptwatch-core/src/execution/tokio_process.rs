use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;

use crate::execution::{
    ProcessExecutor, ProcessExitStatus, ProcessOutput, ProcessSpawnRequest, ProcessWaitFuture,
    RunningProcess,
};
use crate::models::{CoreError, CoreErrorKind, CoreResult, Operation};

/// Output still buffered in the pipes is collected for at most this long after exit.
const OUTPUT_DRAIN_WINDOW: Duration = Duration::from_millis(250);

pub struct TokioProcessExecutor;

impl ProcessExecutor for TokioProcessExecutor {
    fn spawn(&self, request: ProcessSpawnRequest) -> CoreResult<Box<dyn RunningProcess>> {
        let mut cmd = tokio::process::Command::new(&request.command.program);
        cmd.args(&request.command.args);
        cmd.envs(&request.command.env);

        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|error| {
            process_failure(
                request.operation,
                format!(
                    "failed to spawn {}: {error}",
                    request.command.program.display()
                ),
            )
        })?;

        tracing::debug!(
            operation = ?request.operation,
            program = %request.command.program.display(),
            pid = ?child.id(),
            "spawned package manager command"
        );

        Ok(Box::new(TokioRunningProcess {
            pid: child.id(),
            child: Mutex::new(Some(child)),
            started_at: SystemTime::now(),
            timeout: request.timeout,
            operation: request.operation,
        }))
    }
}

struct TokioRunningProcess {
    child: Mutex<Option<Child>>,
    pid: Option<u32>,
    started_at: SystemTime,
    timeout: Option<Duration>,
    operation: Operation,
}

impl RunningProcess for TokioRunningProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn wait(self: Box<Self>) -> ProcessWaitFuture {
        let pid = self.pid;
        let started_at = self.started_at;
        let timeout = self.timeout;
        let operation = self.operation;
        let child = self.child.into_inner().ok().flatten();

        Box::pin(async move {
            let mut child = child.ok_or_else(|| {
                process_failure(operation, "child process already consumed".to_string())
            })?;

            let stdout_reader = tokio::spawn(drain(child.stdout.take()));
            let stderr_reader = tokio::spawn(drain(child.stderr.take()));

            let wait_err = |error: std::io::Error| {
                process_failure(operation, format!("failed to wait for process: {error}"))
            };

            // apt may leave helpers holding the pipes open; wait on exit, not on EOF.
            let status = match timeout {
                Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                    Ok(result) => result.map_err(wait_err)?,
                    Err(_) => {
                        kill_process_group(pid);
                        let _ = tokio::time::timeout(Duration::from_secs(1), child.wait()).await;
                        stdout_reader.abort();
                        stderr_reader.abort();
                        return Err(CoreError::new(
                            CoreErrorKind::Timeout,
                            format!("process timed out after {}ms", limit.as_millis()),
                        )
                        .with_operation(operation));
                    }
                },
                None => child.wait().await.map_err(wait_err)?,
            };

            let stdout = match tokio::time::timeout(OUTPUT_DRAIN_WINDOW, stdout_reader).await {
                Ok(Ok(buffer)) => buffer,
                _ => Vec::new(),
            };
            let stderr = match tokio::time::timeout(OUTPUT_DRAIN_WINDOW, stderr_reader).await {
                Ok(Ok(buffer)) => buffer,
                _ => Vec::new(),
            };

            let status = match status.code() {
                Some(code) => ProcessExitStatus::ExitCode(code),
                None => ProcessExitStatus::Terminated,
            };

            Ok(ProcessOutput {
                status,
                stdout,
                stderr,
                started_at,
                finished_at: SystemTime::now(),
            })
        })
    }
}

async fn drain<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Some(mut handle) = handle {
        let _ = handle.read_to_end(&mut buffer).await;
    }
    buffer
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        let pgid = -(pid as libc::pid_t);
        // SAFETY: signalling a process group we created; ESRCH is harmless.
        unsafe {
            libc::kill(pgid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn process_failure(operation: Operation, message: String) -> CoreError {
    CoreError::new(CoreErrorKind::ProcessFailure, message).with_operation(operation)
}
