use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    UnknownPackage,
    BlockedPackage,
    InvalidInput,
    InvalidConfig,
    ParseFailure,
    Timeout,
    ProcessFailure,
    ProcessTableUnavailable,
    InstallsDisabled,
    Internal,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Operation {
    QueryVersion,
    RefreshIndex,
    Install,
    ScanProcesses,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub package: Option<String>,
    pub operation: Option<Operation>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            package: None,
            operation: None,
            kind,
            message: message.into(),
        }
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// True for failures caused by the request itself rather than the host.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind,
            CoreErrorKind::UnknownPackage
                | CoreErrorKind::BlockedPackage
                | CoreErrorKind::InvalidInput
                | CoreErrorKind::InstallsDisabled
        )
    }
}
