use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{
    CoreError, CoreErrorKind, CoreResult, PackageSpec, PackageVersions, TrackedPackage,
};
use crate::runner::CommandRunner;

/// Point-in-time partition of the table, each half in configuration order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TrackerSnapshot {
    pub updateable: Vec<TrackedPackage>,
    pub current: Vec<TrackedPackage>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RefreshSummary {
    pub updated: Vec<String>,
    pub unknown: Vec<String>,
    pub failed: Vec<(String, CoreError)>,
}

/// In-memory table of tracked packages. Entries can only be read as copies
/// and only change through [`PackageStatusTracker::refresh`].
pub struct PackageStatusTracker {
    runner: Arc<dyn CommandRunner>,
    index: HashMap<String, usize>,
    names: Vec<String>,
    table: RwLock<Vec<TrackedPackage>>,
}

impl PackageStatusTracker {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        specs: impl IntoIterator<Item = PackageSpec>,
    ) -> CoreResult<Self> {
        let mut index = HashMap::new();
        let mut names = Vec::new();
        let mut table = Vec::new();

        for spec in specs {
            if index.insert(spec.name.clone(), table.len()).is_some() {
                return Err(CoreError::new(
                    CoreErrorKind::InvalidConfig,
                    format!("package '{}' is tracked more than once", spec.name),
                )
                .with_package(spec.name));
            }
            names.push(spec.name.clone());
            table.push(TrackedPackage::new(spec));
        }

        Ok(Self {
            runner,
            index,
            names,
            table: RwLock::new(table),
        })
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Configuration order. The set is fixed, so this never touches the table.
    pub fn tracked_names(&self) -> Vec<String> {
        self.names.clone()
    }

    pub fn package(&self, name: &str) -> Option<TrackedPackage> {
        let position = *self.index.get(name)?;
        self.read_table_logged()?.get(position).cloned()
    }

    pub fn snapshot(&self) -> CoreResult<TrackerSnapshot> {
        let table = self.read_table()?;
        let (updateable, current) = table
            .iter()
            .cloned()
            .partition(TrackedPackage::update_available);
        Ok(TrackerSnapshot {
            updateable,
            current,
        })
    }

    pub fn update_available_names(&self) -> Vec<String> {
        self.names_where(TrackedPackage::update_available)
    }

    pub fn auto_update_names(&self) -> Vec<String> {
        self.names_where(|pkg| pkg.spec.auto && pkg.update_available())
    }

    /// Re-queries every named package. Untracked names are skipped, a failed
    /// query leaves that package untouched, and an inconclusive answer (either
    /// version empty) keeps the previous state.
    pub async fn refresh(&self, names: &[String]) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        let mut results: Vec<(usize, PackageVersions)> = Vec::new();

        for name in names {
            let Some(&position) = self.index.get(name.as_str()) else {
                tracing::debug!(package = %name, "skipping refresh of untracked package");
                continue;
            };
            if results.iter().any(|(seen, _)| *seen == position) {
                continue;
            }

            match self.runner.query_version(name).await {
                Ok(versions) if versions.is_known() => results.push((position, versions)),
                Ok(_) => {
                    tracing::debug!(package = %name, "version query was inconclusive");
                    summary.unknown.push(name.clone());
                }
                Err(error) => {
                    tracing::warn!(
                        package = %name,
                        kind = ?error.kind,
                        message = %error.message,
                        "failed to query package version"
                    );
                    summary.failed.push((name.clone(), error));
                }
            }
        }

        let mut table = match self.write_table() {
            Ok(table) => table,
            Err(error) => {
                tracing::error!(message = %error.message, "package table unavailable");
                return summary;
            }
        };

        for (position, versions) in results {
            let entry = &mut table[position];
            entry.installed_version = versions.installed;
            entry.candidate_version = versions.candidate;
            summary.updated.push(entry.name().to_string());
        }

        summary
    }

    fn names_where(&self, predicate: impl Fn(&TrackedPackage) -> bool) -> Vec<String> {
        let Some(table) = self.read_table_logged() else {
            return Vec::new();
        };
        table
            .iter()
            .filter(|&pkg| predicate(pkg))
            .map(|pkg| pkg.name().to_string())
            .collect()
    }

    fn read_table_logged(&self) -> Option<RwLockReadGuard<'_, Vec<TrackedPackage>>> {
        match self.read_table() {
            Ok(table) => Some(table),
            Err(error) => {
                tracing::error!(message = %error.message, "package table unavailable");
                None
            }
        }
    }

    fn read_table(&self) -> CoreResult<RwLockReadGuard<'_, Vec<TrackedPackage>>> {
        self.table.read().map_err(|_| poisoned())
    }

    fn write_table(&self) -> CoreResult<RwLockWriteGuard<'_, Vec<TrackedPackage>>> {
        self.table.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> CoreError {
    CoreError::new(CoreErrorKind::Internal, "package table lock poisoned")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::PackageStatusTracker;
    use crate::models::{CoreErrorKind, PackageSpec, PackageVersions};
    use crate::runner::{CommandRunner, RunnerFuture};

    struct BehindRunner;

    impl CommandRunner for BehindRunner {
        fn query_version<'a>(&'a self, _name: &'a str) -> RunnerFuture<'a, PackageVersions> {
            Box::pin(async { Ok(PackageVersions::new("1.0", "1.1")) })
        }

        fn refresh_index(&self) -> RunnerFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }

        fn install_packages<'a>(&'a self, _names: &'a [String]) -> RunnerFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn poisoned_table_still_reports_tracked_names() {
        let tracker = Arc::new(
            PackageStatusTracker::new(
                Arc::new(BehindRunner),
                [PackageSpec::new("foo"), PackageSpec::new("bar").auto(true)],
            )
            .unwrap(),
        );
        tracker.refresh(&tracker.tracked_names()).await;
        assert_eq!(tracker.update_available_names().len(), 2);

        let poisoner = tracker.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.table.write().unwrap();
            panic!("writer panicked");
        })
        .join();

        assert_eq!(tracker.tracked_names(), vec!["foo".to_string(), "bar".to_string()]);
        assert!(tracker.package("foo").is_none());
        assert!(tracker.auto_update_names().is_empty());
        assert_eq!(tracker.snapshot().unwrap_err().kind, CoreErrorKind::Internal);
    }
}
