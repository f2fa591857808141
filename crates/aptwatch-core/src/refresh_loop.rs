use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::events::EventBroadcaster;
use crate::install::InstallCoordinator;
use crate::models::{CoreError, CoreErrorKind, CoreResult, EventStatus, StatusEvent};
use crate::monitor::ProcessMonitor;
use crate::runner::CommandRunner;
use crate::tracker::{PackageStatusTracker, RefreshSummary};

pub const DEFAULT_BUSY_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RefreshLoopConfig {
    /// How often to re-check while the package manager is busy.
    pub busy_poll_interval: Duration,
    /// How long to stay idle before refreshing the index.
    pub refresh_delay: Duration,
}

impl Default for RefreshLoopConfig {
    fn default() -> Self {
        Self {
            busy_poll_interval: DEFAULT_BUSY_POLL_INTERVAL,
            refresh_delay: DEFAULT_REFRESH_DELAY,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CycleReport {
    pub index_refreshed: bool,
    pub status: RefreshSummary,
    pub auto_installed: Vec<String>,
    pub auto_install_error: Option<CoreError>,
    pub announced: Vec<String>,
}

pub struct CacheRefreshLoop {
    monitor: Arc<ProcessMonitor>,
    runner: Arc<dyn CommandRunner>,
    tracker: Arc<PackageStatusTracker>,
    coordinator: Arc<InstallCoordinator>,
    events: Arc<EventBroadcaster>,
    config: RefreshLoopConfig,
}

impl CacheRefreshLoop {
    pub fn new(
        monitor: Arc<ProcessMonitor>,
        runner: Arc<dyn CommandRunner>,
        tracker: Arc<PackageStatusTracker>,
        coordinator: Arc<InstallCoordinator>,
        events: Arc<EventBroadcaster>,
        config: RefreshLoopConfig,
    ) -> Self {
        Self {
            monitor,
            runner,
            tracker,
            coordinator,
            events,
            config,
        }
    }

    pub fn start(self: Arc<Self>) -> RefreshLoopHandle {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(stop_rx).await });
        RefreshLoopHandle { stop, task }
    }

    /// Runs until `stop` flips to true or its sender is dropped. Only an
    /// unreadable process table ends the loop with an error.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> CoreResult<()> {
        loop {
            while self.check_busy()? {
                if !pause(self.config.busy_poll_interval, &mut stop).await {
                    return Ok(());
                }
            }

            if !pause(self.config.refresh_delay, &mut stop).await {
                return Ok(());
            }

            // the package manager may have started while we were waiting
            if self.check_busy()? {
                tracing::debug!("package manager became busy, postponing index refresh");
                continue;
            }

            self.run_cycle().await;
        }
    }

    /// RefreshIndex, status check, auto-updates and announcements, once.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        match self.runner.refresh_index().await {
            Ok(()) => {
                report.index_refreshed = true;
                if let Err(error) = self.monitor.mark_index_refreshed(Instant::now()) {
                    tracing::warn!(message = %error.message, "failed to record index refresh");
                }
            }
            Err(error) => {
                tracing::error!(
                    kind = ?error.kind,
                    message = %error.message,
                    "package index refresh failed"
                );
            }
        }

        let names = self.tracker.tracked_names();
        report.status = self.tracker.refresh(&names).await;

        let auto = self
            .coordinator
            .without_blocked(self.tracker.auto_update_names());
        if !auto.is_empty() {
            match self.coordinator.install(&auto).await {
                Ok(()) => report.auto_installed = auto,
                Err(error) => {
                    tracing::error!(
                        packages = ?auto,
                        message = %error.message,
                        "automatic update failed"
                    );
                    report.auto_install_error = Some(error);
                }
            }
        }

        for name in self.tracker.update_available_names() {
            let candidate = self
                .tracker
                .package(&name)
                .map(|pkg| pkg.candidate_version)
                .unwrap_or_default();
            self.events.publish(
                StatusEvent::new(name.as_str(), EventStatus::UpdateAvailable)
                    .with_version(candidate),
            );
            report.announced.push(name);
        }

        tracing::info!(
            index_refreshed = report.index_refreshed,
            refreshed = report.status.updated.len(),
            failed = report.status.failed.len(),
            auto_installed = report.auto_installed.len(),
            pending = report.announced.len(),
            "refresh cycle complete"
        );

        report
    }

    fn check_busy(&self) -> CoreResult<bool> {
        self.monitor.is_package_manager_busy().inspect_err(|error| {
            tracing::error!(message = %error.message, "cannot monitor the package manager");
        })
    }
}

/// Sleeps for `duration`; returns false if a stop was requested first.
async fn pause(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if *stop.borrow_and_update() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return true,
            changed = stop.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

pub struct RefreshLoopHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<CoreResult<()>>,
}

impl RefreshLoopHandle {
    /// Resolves when the loop exits on its own.
    pub async fn finished(&mut self) -> CoreResult<()> {
        (&mut self.task).await.map_err(join_failure)?
    }

    pub async fn stop(self) -> CoreResult<()> {
        let _ = self.stop.send(true);
        self.task.await.map_err(join_failure)?
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

fn join_failure(error: tokio::task::JoinError) -> CoreError {
    CoreError::new(
        CoreErrorKind::Internal,
        format!("refresh loop task failed: {error}"),
    )
}
