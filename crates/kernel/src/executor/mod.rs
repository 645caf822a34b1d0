//! Side-effecting collaborators used while a task executes.
//!
//! Planning never touches the filesystem or the network; every mutation
//! goes through an [`Executor`]. Installed package versions are read from
//! a [`PackageEnv`].

mod pip;
mod system;

use std::path::Path;

use async_trait::async_trait;

pub use pip::PipEnvironment;
pub use system::SystemExecutor;

use crate::plugin::PluginError;
use crate::version::Version;

/// Performs the I/O of a single plan operation.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Download `url` to `dest`, replacing any existing file.
    async fn download_asset(&self, url: &str, dest: &Path) -> Result<(), PluginError>;

    /// Install a package into the runtime environment, upgrading when asked.
    async fn invoke_package_install(&self, name: &str, upgrade: bool) -> Result<(), PluginError>;

    /// Delete a file.
    async fn remove_file(&self, path: &Path) -> Result<(), PluginError>;

    /// Move a file into place.
    async fn rename_file(&self, from: &Path, to: &Path) -> Result<(), PluginError>;
}

/// Read access to the packages installed in the runtime environment.
pub trait PackageEnv: Send + Sync {
    /// Installed version of `name`, if the package is present and its
    /// version can be compared.
    fn installed_version(&self, name: &str) -> Option<Version>;

    /// Whether `name` is installed at all, including versions that do not
    /// parse.
    fn is_installed(&self, name: &str) -> bool {
        self.installed_version(name).is_some()
    }
}

/// Canonical form of a package name: lowercase, with runs of `-`, `_`
/// and `.` collapsed to a single `-`.
pub fn normalize_package_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut pending_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_separator = true;
            continue;
        }
        if pending_separator && !normalized.is_empty() {
            normalized.push('-');
        }
        pending_separator = false;
        normalized.extend(c.to_lowercase());
    }
    normalized
}
