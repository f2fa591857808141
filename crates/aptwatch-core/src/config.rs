use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::BroadcastConfig;
use crate::models::{CoreError, CoreErrorKind, CoreResult, PackageSpec};
use crate::monitor::DEFAULT_PACKAGE_MANAGER_PROCESSES;
use crate::refresh_loop::RefreshLoopConfig;
use crate::runner::AptCommands;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DaemonConfig {
    pub packages: Vec<PackageSpec>,
    #[serde(default)]
    pub blocked: Vec<String>,
    #[serde(default = "default_install_enabled")]
    pub install_enabled: bool,
    #[serde(default = "default_busy_poll_secs")]
    pub busy_poll_secs: u64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_busy_cache_ttl_secs")]
    pub busy_cache_ttl_secs: u64,
    #[serde(default = "default_package_manager_processes")]
    pub package_manager_processes: Vec<String>,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

fn default_install_enabled() -> bool {
    true
}

fn default_busy_poll_secs() -> u64 {
    5
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_busy_cache_ttl_secs() -> u64 {
    5
}

fn default_package_manager_processes() -> Vec<String> {
    DEFAULT_PACKAGE_MANAGER_PROCESSES
        .iter()
        .map(|name| name.to_string())
        .collect()
}

fn default_command_timeout_secs() -> u64 {
    30 * 60
}

fn default_event_queue_capacity() -> usize {
    crate::events::DEFAULT_EVENT_QUEUE_CAPACITY
}

fn default_subscriber_capacity() -> usize {
    crate::events::DEFAULT_SUBSCRIBER_CAPACITY
}

impl DaemonConfig {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            invalid_config(format!("unable to read {}: {error}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| invalid_config(format!("malformed configuration: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.packages.is_empty() {
            return Err(invalid_config("at least one package must be tracked"));
        }

        let mut seen = HashSet::new();
        for spec in &self.packages {
            if !is_valid_package_name(&spec.name) {
                return Err(
                    invalid_config(format!("'{}' is not a valid package name", spec.name))
                        .with_package(spec.name.as_str()),
                );
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(
                    invalid_config(format!("package '{}' is listed twice", spec.name))
                        .with_package(spec.name.as_str()),
                );
            }
        }

        if let Some(name) = self.blocked.iter().find(|name| !is_valid_package_name(name)) {
            return Err(invalid_config(format!(
                "blocked entry '{name}' is not a valid package name"
            )));
        }

        if self.package_manager_processes.is_empty() {
            return Err(invalid_config(
                "at least one package manager process name is required",
            ));
        }

        let zeroes = [
            ("busyPollSecs", self.busy_poll_secs == 0),
            ("refreshIntervalSecs", self.refresh_interval_secs == 0),
            ("commandTimeoutSecs", self.command_timeout_secs == 0),
            ("eventQueueCapacity", self.event_queue_capacity == 0),
            ("subscriberCapacity", self.subscriber_capacity == 0),
        ];
        if let Some((field, _)) = zeroes.iter().find(|(_, is_zero)| *is_zero) {
            return Err(invalid_config(format!("{field} must be greater than zero")));
        }

        Ok(())
    }

    pub fn refresh_loop(&self) -> RefreshLoopConfig {
        RefreshLoopConfig {
            busy_poll_interval: Duration::from_secs(self.busy_poll_secs),
            refresh_delay: Duration::from_secs(self.refresh_interval_secs),
        }
    }

    pub fn broadcast(&self) -> BroadcastConfig {
        BroadcastConfig {
            queue_capacity: self.event_queue_capacity,
            subscriber_capacity: self.subscriber_capacity,
        }
    }

    pub fn busy_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.busy_cache_ttl_secs)
    }

    pub fn apt_commands(&self) -> AptCommands {
        AptCommands {
            command_timeout: Some(Duration::from_secs(self.command_timeout_secs)),
            ..AptCommands::default()
        }
    }
}

/// Debian policy: lowercase alphanumerics plus `+ - .`, at least two
/// characters, starting with an alphanumeric.
pub fn is_valid_package_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    name.len() >= 2
        && (first.is_ascii_lowercase() || first.is_ascii_digit())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '-' | '.'))
}

fn invalid_config(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidConfig, message)
}

#[cfg(test)]
mod tests {
    use super::{DaemonConfig, is_valid_package_name};
    use crate::models::CoreErrorKind;
    use std::time::Duration;

    #[test]
    fn applies_defaults() {
        let config = DaemonConfig::from_json_str(
            r#"{"packages": [{"name": "signal-desktop", "niceName": "Signal", "auto": true}]}"#,
        )
        .expect("minimal config should load");

        assert!(config.install_enabled);
        assert!(config.blocked.is_empty());
        assert_eq!(config.packages[0].nice_name.as_deref(), Some("Signal"));
        assert!(config.packages[0].auto);
        assert_eq!(config.refresh_loop().busy_poll_interval, Duration::from_secs(5));
        assert_eq!(config.refresh_loop().refresh_delay, Duration::from_secs(300));
        assert_eq!(config.busy_cache_ttl(), Duration::from_secs(5));
        assert_eq!(
            config.package_manager_processes,
            vec!["apt-get", "aptitude", "dselect"]
        );
    }

    #[test]
    fn rejects_duplicate_packages() {
        let error = DaemonConfig::from_json_str(
            r#"{"packages": [{"name": "foo"}, {"name": "foo", "auto": true}]}"#,
        )
        .expect_err("duplicates must be rejected");
        assert_eq!(error.kind, CoreErrorKind::InvalidConfig);
        assert_eq!(error.package.as_deref(), Some("foo"));
    }

    #[test]
    fn rejects_empty_package_list() {
        assert!(DaemonConfig::from_json_str(r#"{"packages": []}"#).is_err());
    }

    #[test]
    fn rejects_zero_intervals() {
        let error = DaemonConfig::from_json_str(
            r#"{"packages": [{"name": "foo"}], "busyPollSecs": 0}"#,
        )
        .expect_err("zero poll interval must be rejected");
        assert!(error.message.contains("busyPollSecs"));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(
            DaemonConfig::from_json_str(r#"{"packages": [{"name": "foo"}], "canInstal": true}"#)
                .is_err()
        );
    }

    #[test]
    fn package_names_follow_debian_policy() {
        assert!(is_valid_package_name("signal-desktop"));
        assert!(is_valid_package_name("libc6"));
        assert!(is_valid_package_name("g++"));
        assert!(is_valid_package_name("0ad"));
        assert!(!is_valid_package_name("-o"));
        assert!(!is_valid_package_name("--reinstall"));
        assert!(!is_valid_package_name("Foo"));
        assert!(!is_valid_package_name("a"));
        assert!(!is_valid_package_name("foo bar"));
        assert!(!is_valid_package_name(""));
    }
}
