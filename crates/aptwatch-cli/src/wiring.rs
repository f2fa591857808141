use std::sync::Arc;

use aptwatch_core::config::DaemonConfig;
use aptwatch_core::events::EventBroadcaster;
use aptwatch_core::execution::TokioProcessExecutor;
use aptwatch_core::install::InstallCoordinator;
use aptwatch_core::models::CoreResult;
use aptwatch_core::monitor::{ProcFsProcessTable, ProcessMonitor};
use aptwatch_core::refresh_loop::CacheRefreshLoop;
use aptwatch_core::runner::{AptCommandRunner, CommandRunner};
use aptwatch_core::tracker::PackageStatusTracker;
use aptwatch_core::PackageApi;

pub struct Services {
    pub monitor: Arc<ProcessMonitor>,
    pub tracker: Arc<PackageStatusTracker>,
    pub api: PackageApi,
    pub refresh_loop: Arc<CacheRefreshLoop>,
}

/// Builds every component from the configuration. Needs a tokio runtime for
/// the event dispatcher.
pub fn build(config: &DaemonConfig) -> CoreResult<Services> {
    let runner: Arc<dyn CommandRunner> = Arc::new(AptCommandRunner::with_commands(
        Arc::new(TokioProcessExecutor),
        config.apt_commands(),
    ));

    let monitor = Arc::new(ProcessMonitor::with_settings(
        ProcFsProcessTable::new(),
        config.package_manager_processes.iter().cloned(),
        config.busy_cache_ttl(),
    ));
    let tracker = Arc::new(PackageStatusTracker::new(
        runner.clone(),
        config.packages.iter().cloned(),
    )?);
    let events = Arc::new(EventBroadcaster::spawn(config.broadcast()));
    let coordinator = Arc::new(
        InstallCoordinator::new(tracker.clone(), runner.clone(), events.clone())
            .with_blocked(config.blocked.iter().cloned()),
    );

    let refresh_loop = Arc::new(CacheRefreshLoop::new(
        monitor.clone(),
        runner,
        tracker.clone(),
        coordinator.clone(),
        events.clone(),
        config.refresh_loop(),
    ));
    let api = PackageApi::new(tracker.clone(), coordinator, events, config.install_enabled);

    Ok(Services {
        monitor,
        tracker,
        api,
        refresh_loop,
    })
}
