pub mod apt;

pub use apt::{AptCommandRunner, AptCommands, parse_policy_output};

use std::future::Future;
use std::pin::Pin;

use crate::models::{CoreResult, PackageVersions};

pub type RunnerFuture<'a, T> = Pin<Box<dyn Future<Output = CoreResult<T>> + Send + 'a>>;

/// The only seam through which the core touches the host package manager.
pub trait CommandRunner: Send + Sync {
    /// Installed and candidate versions for one package. A package the
    /// manager knows nothing about yields empty strings, not an error.
    fn query_version<'a>(&'a self, name: &'a str) -> RunnerFuture<'a, PackageVersions>;

    fn refresh_index(&self) -> RunnerFuture<'_, ()>;

    /// Installs the whole batch with a single package-manager invocation.
    fn install_packages<'a>(&'a self, names: &'a [String]) -> RunnerFuture<'a, ()>;
}
