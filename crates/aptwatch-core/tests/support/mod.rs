#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aptwatch_core::events::{BroadcastConfig, EventBroadcaster, Subscriber};
use aptwatch_core::install::InstallCoordinator;
use aptwatch_core::models::{
    CoreError, CoreErrorKind, Operation, PackageSpec, PackageVersions, StatusEvent,
};
use aptwatch_core::runner::{CommandRunner, RunnerFuture};
use aptwatch_core::tracker::PackageStatusTracker;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    Query(String),
    RefreshIndex,
    Install(Vec<String>),
}

#[derive(Default)]
struct FakeState {
    versions: HashMap<String, PackageVersions>,
    failing_queries: HashSet<String>,
    fail_install: bool,
    fail_refresh: bool,
    install_delay: Option<Duration>,
    calls: Vec<Call>,
}

/// Scripted stand-in for apt. A successful install moves each package's
/// installed version up to its candidate.
#[derive(Default)]
pub struct FakeRunner {
    state: Mutex<FakeState>,
    installs_in_flight: AtomicUsize,
    peak_installs: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_versions(&self, name: &str, installed: &str, candidate: &str) {
        self.state
            .lock()
            .unwrap()
            .versions
            .insert(name.to_string(), PackageVersions::new(installed, candidate));
    }

    pub fn fail_query(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_queries
            .insert(name.to_string());
    }

    pub fn heal_query(&self, name: &str) {
        self.state.lock().unwrap().failing_queries.remove(name);
    }

    pub fn fail_install(&self) {
        self.state.lock().unwrap().fail_install = true;
    }

    pub fn fail_refresh(&self) {
        self.state.lock().unwrap().fail_refresh = true;
    }

    pub fn delay_installs(&self, delay: Duration) {
        self.state.lock().unwrap().install_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn install_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Install(names) => Some(names),
                _ => None,
            })
            .collect()
    }

    pub fn peak_concurrent_installs(&self) -> usize {
        self.peak_installs.load(Ordering::SeqCst)
    }
}

impl CommandRunner for FakeRunner {
    fn query_version<'a>(&'a self, name: &'a str) -> RunnerFuture<'a, PackageVersions> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Query(name.to_string()));
            if state.failing_queries.contains(name) {
                return Err(CoreError::new(CoreErrorKind::ProcessFailure, "apt-cache crashed")
                    .with_operation(Operation::QueryVersion)
                    .with_package(name));
            }
            Ok(state.versions.get(name).cloned().unwrap_or_default())
        })
    }

    fn refresh_index(&self) -> RunnerFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::RefreshIndex);
            if state.fail_refresh {
                return Err(CoreError::new(CoreErrorKind::ProcessFailure, "apt-get update failed")
                    .with_operation(Operation::RefreshIndex));
            }
            Ok(())
        })
    }

    fn install_packages<'a>(&'a self, names: &'a [String]) -> RunnerFuture<'a, ()> {
        Box::pin(async move {
            let delay = {
                let mut state = self.state.lock().unwrap();
                state.calls.push(Call::Install(names.to_vec()));
                state.install_delay
            };

            let now = self.installs_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_installs.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.installs_in_flight.fetch_sub(1, Ordering::SeqCst);

            let mut state = self.state.lock().unwrap();
            if state.fail_install {
                return Err(CoreError::new(CoreErrorKind::ProcessFailure, "apt-get exited with code 100")
                    .with_operation(Operation::Install));
            }
            for name in names {
                if let Some(versions) = state.versions.get_mut(name) {
                    versions.installed = versions.candidate.clone();
                }
            }
            Ok(())
        })
    }
}

pub struct Harness {
    pub runner: Arc<FakeRunner>,
    pub tracker: Arc<PackageStatusTracker>,
    pub events: Arc<EventBroadcaster>,
    pub coordinator: Arc<InstallCoordinator>,
}

pub fn harness(specs: Vec<PackageSpec>) -> Harness {
    harness_with_blocked(specs, Vec::<String>::new())
}

pub fn harness_with_blocked(specs: Vec<PackageSpec>, blocked: Vec<String>) -> Harness {
    let runner = FakeRunner::new();
    let tracker = Arc::new(
        PackageStatusTracker::new(runner.clone(), specs).expect("specs should be unique"),
    );
    let events = Arc::new(EventBroadcaster::spawn(BroadcastConfig::default()));
    let coordinator = Arc::new(
        InstallCoordinator::new(tracker.clone(), runner.clone(), events.clone())
            .with_blocked(blocked),
    );

    Harness {
        runner,
        tracker,
        events,
        coordinator,
    }
}

/// `foo` (manual, current) and `bar` (auto-update, behind).
pub fn foo_bar() -> Harness {
    let harness = harness(vec![
        PackageSpec::new("foo"),
        PackageSpec::new("bar").auto(true),
    ]);
    harness.runner.set_versions("foo", "1.0", "1.0");
    harness.runner.set_versions("bar", "2.0", "2.1");
    harness
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|name| name.to_string()).collect()
}

/// Everything delivered to `subscriber` until the stream goes quiet.
pub async fn collect(subscriber: &mut Subscriber) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(100), subscriber.recv()).await
    {
        events.push(event);
    }
    events
}
