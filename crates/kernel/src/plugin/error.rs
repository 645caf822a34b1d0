//! Plugin manager error types with one-line, user-facing messages.
//!
//! Every message names the offending plugin, package or file so it can be
//! shown to the user verbatim.

use thiserror::Error;

/// Errors raised while validating, planning or executing a task.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The catalog has no record for the plugin.
    #[error("plugin '{plugin}' is not in the catalog")]
    UnknownPlugin { plugin: String },

    /// The plugin is not loaded by the host.
    #[error("plugin '{plugin}' is not installed")]
    NotInstalled { plugin: String },

    /// The catalog has not been loaded yet.
    #[error("plugin catalog is not loaded yet, refresh it first")]
    CatalogNotLoaded,

    /// Planning produced no operations.
    #[error("nothing to do")]
    NothingToDo,

    /// A confirmed task has not finished executing yet.
    #[error("another task is still running, wait for it to finish")]
    TaskRunning,

    /// The request targets the plugin manager itself.
    #[error("plugin '{plugin}' cannot {action} itself")]
    SelfTargetRejected { plugin: String, action: String },

    /// A raw package requirement has no recognizable name.
    #[error("malformed requirement '{requirement}'")]
    MalformedRequirement { requirement: String },

    /// A download, rename or removal failed.
    #[error("{target}: {details}")]
    Io { target: String, details: String },

    /// The package manager invocation failed.
    #[error("package '{package}': {details}")]
    Process { package: String, details: String },
}

impl PluginError {
    pub fn unknown_plugin(plugin: impl Into<String>) -> Self {
        Self::UnknownPlugin {
            plugin: plugin.into(),
        }
    }

    pub fn not_installed(plugin: impl Into<String>) -> Self {
        Self::NotInstalled {
            plugin: plugin.into(),
        }
    }

    pub fn self_target(plugin: impl Into<String>, action: impl Into<String>) -> Self {
        Self::SelfTargetRejected {
            plugin: plugin.into(),
            action: action.into(),
        }
    }

    /// Wrap an I/O-class failure, flattening the error chain into one line.
    pub fn io(target: impl Into<String>, err: impl Into<anyhow::Error>) -> Self {
        Self::Io {
            target: target.into(),
            details: one_line(&err.into()),
        }
    }

    /// Wrap a package-manager failure, flattening the error chain into one line.
    pub fn process(package: impl Into<String>, err: impl Into<anyhow::Error>) -> Self {
        Self::Process {
            package: package.into(),
            details: one_line(&err.into()),
        }
    }
}

/// Join an error chain into `outer: inner: root` with no line breaks.
fn one_line(err: &anyhow::Error) -> String {
    err.chain()
        .map(|cause| cause.to_string().replace('\n', " "))
        .collect::<Vec<_>>()
        .join(": ")
}
