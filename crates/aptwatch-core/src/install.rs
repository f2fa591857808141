use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::events::EventBroadcaster;
use crate::models::{CoreError, CoreErrorKind, CoreResult, EventStatus, Operation, StatusEvent};
use crate::runner::CommandRunner;
use crate::tracker::PackageStatusTracker;

/// Validates install batches and runs them one at a time.
///
/// Every install, whether requested by a client or by the refresh loop's
/// auto-update pass, goes through the same lock, so the same package is never
/// handed to the package manager twice concurrently.
pub struct InstallCoordinator {
    tracker: Arc<PackageStatusTracker>,
    runner: Arc<dyn CommandRunner>,
    events: Arc<EventBroadcaster>,
    blocked: HashSet<String>,
    install_lock: Mutex<()>,
}

impl InstallCoordinator {
    pub fn new(
        tracker: Arc<PackageStatusTracker>,
        runner: Arc<dyn CommandRunner>,
        events: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            tracker,
            runner,
            events,
            blocked: HashSet::new(),
            install_lock: Mutex::new(()),
        }
    }

    pub fn with_blocked(mut self, blocked: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.blocked.extend(blocked.into_iter().map(Into::into));
        self
    }

    /// Accepts or rejects the whole batch. Duplicates collapse onto their
    /// first occurrence.
    pub fn validate(&self, names: &[String]) -> CoreResult<Vec<String>> {
        let mut batch: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !batch.contains(name) {
                batch.push(name.clone());
            }
        }

        let unknown: Vec<&str> = batch
            .iter()
            .filter(|name| !self.tracker.has_package(name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(rejection(
                CoreErrorKind::UnknownPackage,
                format!("packages are not tracked: {}", unknown.join(", ")),
                &unknown,
            ));
        }

        let blocked: Vec<&str> = batch
            .iter()
            .filter(|name| self.blocked.contains(name.as_str()))
            .map(String::as_str)
            .collect();
        if !blocked.is_empty() {
            return Err(rejection(
                CoreErrorKind::BlockedPackage,
                format!("packages may not be installed: {}", blocked.join(", ")),
                &blocked,
            ));
        }

        Ok(batch)
    }

    pub async fn install(&self, names: &[String]) -> CoreResult<()> {
        let batch = self.validate(names)?;
        if batch.is_empty() {
            return Ok(());
        }

        let _guard = self.install_lock.lock().await;

        for name in &batch {
            self.events
                .publish(StatusEvent::new(name.as_str(), EventStatus::Updating));
        }

        tracing::info!(packages = ?batch, "installing packages");
        if let Err(error) = self.runner.install_packages(&batch).await {
            tracing::error!(
                packages = ?batch,
                kind = ?error.kind,
                message = %error.message,
                "package install failed"
            );
            for name in &batch {
                self.events
                    .publish(StatusEvent::new(name.as_str(), EventStatus::UpdateFailed));
            }
            return Err(error.with_operation(Operation::Install));
        }

        let summary = self.tracker.refresh(&batch).await;
        if !summary.failed.is_empty() {
            tracing::warn!(
                failed = summary.failed.len(),
                "installed packages could not all be re-queried"
            );
        }

        for name in &batch {
            let version = self
                .tracker
                .package(name)
                .map(|pkg| pkg.installed_version)
                .unwrap_or_default();
            tracing::info!(package = %name, version = %version, "package updated");
            self.events
                .publish(StatusEvent::new(name.as_str(), EventStatus::Updated).with_version(version));
        }

        Ok(())
    }

    pub fn is_blocked(&self, name: &str) -> bool {
        self.blocked.contains(name)
    }

    /// Drops blocked names from a batch assembled by the daemon itself. Only
    /// explicit requests are rejected as a whole.
    pub fn without_blocked(&self, names: Vec<String>) -> Vec<String> {
        names
            .into_iter()
            .filter(|name| {
                let blocked = self.is_blocked(name);
                if blocked {
                    tracing::debug!(package = %name, "skipping blocked package");
                }
                !blocked
            })
            .collect()
    }

    /// Installs every pending update except blocked packages.
    pub async fn install_all(&self) -> CoreResult<()> {
        let pending = self.without_blocked(self.tracker.update_available_names());
        self.install(&pending).await
    }
}

fn rejection(kind: CoreErrorKind, message: String, names: &[&str]) -> CoreError {
    let error = CoreError::new(kind, message).with_operation(Operation::Install);
    match names {
        [single] => error.with_package(*single),
        _ => error,
    }
}
