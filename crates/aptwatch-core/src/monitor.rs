use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::models::{CoreError, CoreErrorKind, CoreResult, Operation};

pub const DEFAULT_BUSY_CACHE_TTL: Duration = Duration::from_secs(5);
pub const DEFAULT_PACKAGE_MANAGER_PROCESSES: &[&str] = &["apt-get", "aptitude", "dselect"];

/// Source of the command names of every live process on the host.
pub trait ProcessTable: Send + Sync {
    fn command_names(&self) -> io::Result<Vec<String>>;
}

/// Reads `<root>/<pid>/comm` for every numeric entry under a procfs mount.
pub struct ProcFsProcessTable {
    root: PathBuf,
}

impl ProcFsProcessTable {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcFsProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProcFsProcessTable {
    fn command_names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(pid) = file_name.to_str() else {
                continue;
            };
            if pid.is_empty() || !pid.bytes().all(|byte| byte.is_ascii_digit()) {
                continue;
            }

            // processes exit mid-scan; a missing comm is not an error
            if let Ok(comm) = fs::read_to_string(entry.path().join("comm")) {
                names.push(comm.trim_end_matches('\n').to_string());
            }
        }

        Ok(names)
    }
}

#[derive(Debug, Default)]
struct RefreshState {
    last_check: Option<Instant>,
    busy: bool,
    last_index_refresh: Option<Instant>,
}

/// Answers "is the host package manager running?" with a bounded-staleness cache.
pub struct ProcessMonitor {
    table: Box<dyn ProcessTable>,
    watched: HashSet<String>,
    ttl: Duration,
    state: Mutex<RefreshState>,
}

impl ProcessMonitor {
    pub fn new(table: impl ProcessTable + 'static) -> Self {
        Self::with_settings(
            table,
            DEFAULT_PACKAGE_MANAGER_PROCESSES.iter().copied(),
            DEFAULT_BUSY_CACHE_TTL,
        )
    }

    pub fn with_settings(
        table: impl ProcessTable + 'static,
        watched: impl IntoIterator<Item = impl Into<String>>,
        ttl: Duration,
    ) -> Self {
        Self {
            table: Box::new(table),
            watched: watched.into_iter().map(Into::into).collect(),
            ttl,
            state: Mutex::new(RefreshState::default()),
        }
    }

    /// Rescans at most once per TTL window. An unreadable process table is an
    /// error; callers treat it as fatal.
    pub fn is_package_manager_busy(&self) -> CoreResult<bool> {
        let mut state = self.lock_state()?;
        let now = Instant::now();

        if let Some(last_check) = state.last_check
            && now.saturating_duration_since(last_check) < self.ttl
        {
            tracing::trace!(busy = state.busy, "using cached package manager state");
            return Ok(state.busy);
        }

        let names = self.table.command_names().map_err(|error| {
            CoreError::new(
                CoreErrorKind::ProcessTableUnavailable,
                format!("unable to read the process table: {error}"),
            )
            .with_operation(Operation::ScanProcesses)
        })?;

        let active = names.iter().find(|name| self.watched.contains(name.as_str()));
        state.busy = active.is_some();
        state.last_check = Some(now);

        if let Some(process) = active {
            tracing::debug!(process = %process, "package manager is running");
            state.last_index_refresh = None;
        }

        Ok(state.busy)
    }

    pub fn last_index_refresh(&self) -> Option<Instant> {
        self.state.lock().ok()?.last_index_refresh
    }

    pub fn mark_index_refreshed(&self, at: Instant) -> CoreResult<()> {
        self.lock_state()?.last_index_refresh = Some(at);
        Ok(())
    }

    fn lock_state(&self) -> CoreResult<MutexGuard<'_, RefreshState>> {
        self.state.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "process monitor mutex poisoned")
                .with_operation(Operation::ScanProcesses)
        })
    }
}
