//! Transport-agnostic request handling for the HTTP/WebSocket front end.
//!
//! Routing lives outside this crate; handlers call into [`PackageApi`] and
//! serialize whatever comes back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{EventBroadcaster, Subscriber, SubscriberId};
use crate::install::InstallCoordinator;
use crate::models::{CoreError, CoreErrorKind, TrackedPackage};
use crate::tracker::PackageStatusTracker;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageView {
    pub name: String,
    pub nice_name: String,
    pub auto: bool,
    pub version: String,
    pub update_available: bool,
    pub available_version: String,
}

impl From<&TrackedPackage> for PackageView {
    fn from(package: &TrackedPackage) -> Self {
        Self {
            name: package.name().to_string(),
            nice_name: package.display_name().to_string(),
            auto: package.spec.auto,
            version: package.installed_version.clone(),
            update_available: package.update_available(),
            available_version: package.candidate_version.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PackageList {
    pub updateable: Vec<PackageView>,
    pub current: Vec<PackageView>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ApiErrorClass {
    BadRequest,
    Forbidden,
    Internal,
}

impl ApiErrorClass {
    pub fn status_code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::Internal => 500,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub class: ApiErrorClass,
    pub message: String,
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        let class = match error.kind {
            CoreErrorKind::InstallsDisabled => ApiErrorClass::Forbidden,
            _ if error.is_client_error() => ApiErrorClass::BadRequest,
            _ => ApiErrorClass::Internal,
        };
        Self {
            class,
            message: error.message,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub struct PackageApi {
    tracker: Arc<PackageStatusTracker>,
    coordinator: Arc<InstallCoordinator>,
    events: Arc<EventBroadcaster>,
    install_enabled: bool,
}

impl PackageApi {
    pub fn new(
        tracker: Arc<PackageStatusTracker>,
        coordinator: Arc<InstallCoordinator>,
        events: Arc<EventBroadcaster>,
        install_enabled: bool,
    ) -> Self {
        Self {
            tracker,
            coordinator,
            events,
            install_enabled,
        }
    }

    pub fn list(&self) -> ApiResult<PackageList> {
        let snapshot = self.tracker.snapshot()?;
        Ok(PackageList {
            updateable: snapshot.updateable.iter().map(PackageView::from).collect(),
            current: snapshot.current.iter().map(PackageView::from).collect(),
        })
    }

    pub async fn install(&self, names: &[String]) -> ApiResult<()> {
        self.ensure_installs_enabled()?;
        self.coordinator.install(names).await?;
        Ok(())
    }

    pub async fn install_all(&self) -> ApiResult<()> {
        self.ensure_installs_enabled()?;
        self.coordinator.install_all().await?;
        Ok(())
    }

    pub fn subscribe(&self) -> Subscriber {
        self.events.subscribe()
    }

    /// Call when the transport reports the connection closed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.events.unsubscribe(id)
    }

    fn ensure_installs_enabled(&self) -> Result<(), CoreError> {
        if self.install_enabled {
            Ok(())
        } else {
            Err(CoreError::new(
                CoreErrorKind::InstallsDisabled,
                "package installation is disabled on this host",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiError, ApiErrorClass, PackageView};
    use crate::models::{CoreError, CoreErrorKind, PackageSpec, TrackedPackage};

    #[test]
    fn view_uses_wire_field_names() {
        let package = TrackedPackage {
            spec: PackageSpec::new("signal-desktop").nice_name("Signal").auto(true),
            installed_version: "6.40.0".to_string(),
            candidate_version: "6.41.0".to_string(),
        };
        let json = serde_json::to_value(PackageView::from(&package)).unwrap();

        assert_eq!(json["name"], "signal-desktop");
        assert_eq!(json["niceName"], "Signal");
        assert_eq!(json["auto"], true);
        assert_eq!(json["version"], "6.40.0");
        assert_eq!(json["updateAvailable"], true);
        assert_eq!(json["availableVersion"], "6.41.0");
    }

    #[test]
    fn classifies_core_errors() {
        let cases = [
            (CoreErrorKind::UnknownPackage, ApiErrorClass::BadRequest, 400),
            (CoreErrorKind::BlockedPackage, ApiErrorClass::BadRequest, 400),
            (CoreErrorKind::InstallsDisabled, ApiErrorClass::Forbidden, 403),
            (CoreErrorKind::ProcessFailure, ApiErrorClass::Internal, 500),
            (CoreErrorKind::Timeout, ApiErrorClass::Internal, 500),
        ];

        for (kind, class, status) in cases {
            let error = ApiError::from(CoreError::new(kind, "x"));
            assert_eq!(error.class, class, "{kind:?}");
            assert_eq!(error.class.status_code(), status);
        }
    }
}
