pub mod api;
pub mod config;
pub mod events;
pub mod execution;
pub mod install;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod refresh_loop;
pub mod runner;
pub mod tracker;

pub use api::{ApiError, ApiErrorClass, PackageApi, PackageList, PackageView};
pub use config::DaemonConfig;
pub use events::{BroadcastConfig, EventBroadcaster, Subscriber, SubscriberId};
pub use install::InstallCoordinator;
pub use monitor::{ProcFsProcessTable, ProcessMonitor, ProcessTable};
pub use refresh_loop::{CacheRefreshLoop, CycleReport, RefreshLoopConfig, RefreshLoopHandle};
pub use runner::{AptCommandRunner, CommandRunner};
pub use tracker::{PackageStatusTracker, RefreshSummary, TrackerSnapshot};
