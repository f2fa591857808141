pub mod tokio_process;

pub use tokio_process::TokioProcessExecutor;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::{Duration, SystemTime};

use crate::models::{CoreError, CoreErrorKind, CoreResult, Operation};

pub type ProcessWaitFuture = Pin<Box<dyn Future<Output = CoreResult<ProcessOutput>> + Send>>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn validate(&self, operation: Operation) -> CoreResult<()> {
        if self.program.as_os_str().is_empty() {
            return Err(invalid_input(
                operation,
                "command program path must not be empty",
            ));
        }

        if self
            .args
            .iter()
            .any(|arg| arg.is_empty() || arg.contains('\0'))
        {
            return Err(invalid_input(
                operation,
                "command args must be non-empty and must not contain NUL bytes",
            ));
        }

        if self
            .env
            .iter()
            .any(|(key, value)| key.is_empty() || key.contains('\0') || value.contains('\0'))
        {
            return Err(invalid_input(
                operation,
                "environment keys must be non-empty and no entry may contain NUL bytes",
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessSpawnRequest {
    pub operation: Operation,
    pub command: CommandSpec,
    pub timeout: Option<Duration>,
    pub requested_at: SystemTime,
}

impl ProcessSpawnRequest {
    pub fn new(operation: Operation, command: CommandSpec) -> Self {
        Self {
            operation,
            command,
            timeout: None,
            requested_at: SystemTime::now(),
        }
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.command.validate(self.operation)?;

        if let Some(timeout) = self.timeout
            && timeout.is_zero()
        {
            return Err(invalid_input(
                self.operation,
                "timeout must be greater than zero when provided",
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessExitStatus {
    ExitCode(i32),
    Terminated,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessOutput {
    pub status: ProcessExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
}

pub trait RunningProcess: Send + Sync {
    fn pid(&self) -> Option<u32>;

    fn wait(self: Box<Self>) -> ProcessWaitFuture;
}

pub trait ProcessExecutor: Send + Sync {
    fn spawn(&self, request: ProcessSpawnRequest) -> CoreResult<Box<dyn RunningProcess>>;
}

pub fn spawn_validated(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
) -> CoreResult<Box<dyn RunningProcess>> {
    request.validate()?;
    executor.spawn(request)
}

/// Runs a command to completion and returns its stdout, failing on any
/// non-zero exit or signal termination.
pub async fn run_and_collect_stdout(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
) -> CoreResult<String> {
    let operation = request.operation;
    let program = request.command.program.display().to_string();

    let process = spawn_validated(executor, request)?;
    let output = process.wait().await?;

    match output.status {
        ProcessExitStatus::ExitCode(0) => String::from_utf8(output.stdout).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ParseFailure,
                format!("{program} stdout is not valid UTF-8: {error}"),
            )
            .with_operation(operation)
        }),
        ProcessExitStatus::ExitCode(code) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(CoreError::new(
                CoreErrorKind::ProcessFailure,
                format!("{program} exited with code {code}: {}", stderr.trim()),
            )
            .with_operation(operation))
        }
        ProcessExitStatus::Terminated => Err(CoreError::new(
            CoreErrorKind::ProcessFailure,
            format!("{program} was terminated by signal"),
        )
        .with_operation(operation)),
    }
}

fn invalid_input(operation: Operation, message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message).with_operation(operation)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{CommandSpec, ProcessSpawnRequest};
    use crate::models::{CoreErrorKind, Operation};

    #[test]
    fn rejects_empty_program() {
        let request = ProcessSpawnRequest::new(Operation::RefreshIndex, CommandSpec::new(""));
        let error = request.validate().expect_err("empty program must be rejected");
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
        assert_eq!(error.operation, Some(Operation::RefreshIndex));
    }

    #[test]
    fn rejects_nul_in_args() {
        let request = ProcessSpawnRequest::new(
            Operation::Install,
            CommandSpec::new("/usr/bin/apt-get").arg("install").arg("foo\0bar"),
        );
        assert!(request.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let request = ProcessSpawnRequest::new(
            Operation::QueryVersion,
            CommandSpec::new("/usr/bin/apt-cache").args(["policy", "foo"]),
        )
        .timeout(Some(Duration::ZERO));
        assert!(request.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_request() {
        let request = ProcessSpawnRequest::new(
            Operation::Install,
            CommandSpec::new("/usr/bin/apt-get")
                .args(["install", "-y", "foo"])
                .env("DEBIAN_FRONTEND", "noninteractive"),
        )
        .timeout(Some(Duration::from_secs(30)));
        assert!(request.validate().is_ok());
    }
}
