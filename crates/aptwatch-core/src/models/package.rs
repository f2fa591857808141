use serde::{Deserialize, Serialize};

/// Configured identity of a tracked package.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nice_name: Option<String>,
    #[serde(default)]
    pub auto: bool,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nice_name: None,
            auto: false,
        }
    }

    pub fn nice_name(mut self, nice_name: impl Into<String>) -> Self {
        self.nice_name = Some(nice_name.into());
        self
    }

    pub fn auto(mut self, auto: bool) -> Self {
        self.auto = auto;
        self
    }
}

/// Raw result of a version-policy query. Empty strings mean "unknown".
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PackageVersions {
    pub installed: String,
    pub candidate: String,
}

impl PackageVersions {
    pub fn new(installed: impl Into<String>, candidate: impl Into<String>) -> Self {
        Self {
            installed: installed.into(),
            candidate: candidate.into(),
        }
    }

    pub fn is_known(&self) -> bool {
        !self.installed.is_empty() && !self.candidate.is_empty()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrackedPackage {
    pub spec: PackageSpec,
    pub installed_version: String,
    pub candidate_version: String,
}

impl TrackedPackage {
    pub fn new(spec: PackageSpec) -> Self {
        Self {
            spec,
            installed_version: String::new(),
            candidate_version: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn display_name(&self) -> &str {
        self.spec.nice_name.as_deref().unwrap_or(&self.spec.name)
    }

    pub fn update_available(&self) -> bool {
        !self.installed_version.is_empty()
            && !self.candidate_version.is_empty()
            && self.installed_version != self.candidate_version
    }
}

#[cfg(test)]
mod tests {
    use super::{PackageSpec, TrackedPackage};

    fn package(installed: &str, candidate: &str) -> TrackedPackage {
        TrackedPackage {
            spec: PackageSpec::new("foo"),
            installed_version: installed.to_string(),
            candidate_version: candidate.to_string(),
        }
    }

    #[test]
    fn update_available_requires_both_versions() {
        assert!(!package("", "").update_available());
        assert!(!package("1.0", "").update_available());
        assert!(!package("", "1.0").update_available());
    }

    #[test]
    fn update_available_is_plain_inequality() {
        assert!(!package("1.0", "1.0").update_available());
        assert!(package("2.0", "2.1").update_available());
        // downgrade candidates still count; versions are not ordered
        assert!(package("2.1", "2.0").update_available());
    }

    #[test]
    fn display_name_falls_back_to_package_name() {
        let plain = TrackedPackage::new(PackageSpec::new("signal-desktop"));
        assert_eq!(plain.display_name(), "signal-desktop");

        let nice = TrackedPackage::new(PackageSpec::new("signal-desktop").nice_name("Signal"));
        assert_eq!(nice.display_name(), "Signal");
    }
}
