pub mod error;
pub mod event;
pub mod package;

pub use error::{CoreError, CoreErrorKind, CoreResult, Operation};
pub use event::{EventStatus, StatusEvent};
pub use package::{PackageSpec, PackageVersions, TrackedPackage};
