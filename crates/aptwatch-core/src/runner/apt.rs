use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::execution::{
    CommandSpec, ProcessExecutor, ProcessSpawnRequest, run_and_collect_stdout,
};
use crate::models::{CoreError, CoreErrorKind, Operation, PackageVersions};
use crate::runner::{CommandRunner, RunnerFuture};

const APT_NONE_VERSION: &str = "(none)";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AptCommands {
    pub apt_get: PathBuf,
    pub apt_cache: PathBuf,
    pub query_timeout: Option<Duration>,
    pub command_timeout: Option<Duration>,
}

impl Default for AptCommands {
    fn default() -> Self {
        Self {
            apt_get: PathBuf::from("/usr/bin/apt-get"),
            apt_cache: PathBuf::from("/usr/bin/apt-cache"),
            query_timeout: Some(Duration::from_secs(60)),
            command_timeout: Some(Duration::from_secs(30 * 60)),
        }
    }
}

pub fn apt_policy_request(commands: &AptCommands, name: &str) -> ProcessSpawnRequest {
    ProcessSpawnRequest::new(
        Operation::QueryVersion,
        CommandSpec::new(&commands.apt_cache)
            .arg("policy")
            .arg(name)
            .env("LC_ALL", "C"),
    )
    .timeout(commands.query_timeout)
}

pub fn apt_update_request(commands: &AptCommands) -> ProcessSpawnRequest {
    ProcessSpawnRequest::new(
        Operation::RefreshIndex,
        CommandSpec::new(&commands.apt_get)
            .arg("update")
            .env("LC_ALL", "C"),
    )
    .timeout(commands.command_timeout)
}

pub fn apt_install_request(commands: &AptCommands, names: &[String]) -> ProcessSpawnRequest {
    ProcessSpawnRequest::new(
        Operation::Install,
        CommandSpec::new(&commands.apt_get)
            .args(["install", "-y", "--"])
            .args(names.iter().cloned())
            .env("DEBIAN_FRONTEND", "noninteractive")
            .env("LC_ALL", "C"),
    )
    .timeout(commands.command_timeout)
}

pub struct AptCommandRunner {
    executor: Arc<dyn ProcessExecutor>,
    commands: AptCommands,
}

impl AptCommandRunner {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self::with_commands(executor, AptCommands::default())
    }

    pub fn with_commands(executor: Arc<dyn ProcessExecutor>, commands: AptCommands) -> Self {
        Self { executor, commands }
    }
}

impl CommandRunner for AptCommandRunner {
    fn query_version<'a>(&'a self, name: &'a str) -> RunnerFuture<'a, PackageVersions> {
        Box::pin(async move {
            let request = apt_policy_request(&self.commands, name);
            let raw = run_and_collect_stdout(self.executor.as_ref(), request)
                .await
                .map_err(|error| error.with_package(name))?;
            Ok(parse_policy_output(&raw))
        })
    }

    fn refresh_index(&self) -> RunnerFuture<'_, ()> {
        Box::pin(async move {
            let request = apt_update_request(&self.commands);
            run_and_collect_stdout(self.executor.as_ref(), request).await?;
            Ok(())
        })
    }

    fn install_packages<'a>(&'a self, names: &'a [String]) -> RunnerFuture<'a, ()> {
        Box::pin(async move {
            if names.is_empty() {
                return Err(CoreError::new(
                    CoreErrorKind::InvalidInput,
                    "install batch must name at least one package",
                )
                .with_operation(Operation::Install));
            }

            let request = apt_install_request(&self.commands, names);
            run_and_collect_stdout(self.executor.as_ref(), request).await?;
            Ok(())
        })
    }
}

/// Extracts the `Installed:` and `Candidate:` fields from `apt-cache policy`.
///
/// Only the package header block is read; the version table below it repeats
/// versions and is ignored. `(none)` and missing fields map to empty strings.
pub fn parse_policy_output(output: &str) -> PackageVersions {
    let mut versions = PackageVersions::default();

    for line in output.lines().map(str::trim) {
        if line.starts_with("Version table") {
            break;
        }

        if let Some(value) = line.strip_prefix("Installed:") {
            versions.installed = normalize_version(value);
        } else if let Some(value) = line.strip_prefix("Candidate:") {
            versions.candidate = normalize_version(value);
        }
    }

    versions
}

fn normalize_version(raw: &str) -> String {
    let value = raw.trim();
    if value == APT_NONE_VERSION {
        String::new()
    } else {
        value.to_string()
    }
}
