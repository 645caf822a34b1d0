//! Dependency checks for plugins and runtime packages.
//!
//! A dependency is either another plugin managed by the host or a package
//! installed in the runtime environment. [`DependencyChecker::check`]
//! answers whether a dependency is satisfied and [`DependencyError::operation`]
//! turns a failed check into the remediation the planner should apply.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::error::PluginError;
use super::runtime::Runtime;
use crate::executor::PackageEnv;
use crate::version::{Operator, RequirementParseError, Version, VersionRequirement};

/// Something a plugin can depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyTarget {
    /// A plugin managed by the host, by id.
    Plugin(String),
    /// A package in the runtime environment, by name.
    Package(String),
}

impl DependencyTarget {
    pub fn name(&self) -> &str {
        match self {
            Self::Plugin(name) | Self::Package(name) => name,
        }
    }

    pub fn is_plugin(&self) -> bool {
        matches!(self, Self::Plugin(_))
    }
}

impl fmt::Display for DependencyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin(id) => write!(f, "plugin '{id}'"),
            Self::Package(name) => write!(f, "package '{name}'"),
        }
    }
}

/// What should happen to a dependency after it has been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyOperation {
    Ignore,
    Install,
    Upgrade,
}

/// Why a dependency check did not pass.
#[derive(Debug, Clone, Error)]
pub enum DependencyError {
    #[error("{target} is required but not installed")]
    NotFound { target: DependencyTarget },

    #[error("{target} {found} does not satisfy '{requirement}'")]
    NotMet {
        target: DependencyTarget,
        requirement: String,
        found: Version,
    },

    #[error("{target} declares an invalid requirement '{requirement}': {source}")]
    Invalid {
        target: DependencyTarget,
        requirement: String,
        #[source]
        source: RequirementParseError,
    },
}

impl DependencyError {
    /// Remediation for this failure. Invalid requirements are never acted on.
    pub fn operation(&self) -> DependencyOperation {
        match self {
            Self::NotFound { .. } => DependencyOperation::Install,
            Self::NotMet { .. } => DependencyOperation::Upgrade,
            Self::Invalid { .. } => DependencyOperation::Ignore,
        }
    }
}

/// Operation to apply for the outcome of [`DependencyChecker::check`].
pub fn operation_for(result: &Result<(), DependencyError>) -> DependencyOperation {
    match result {
        Ok(()) => DependencyOperation::Ignore,
        Err(e) => e.operation(),
    }
}

/// Checks plugin dependencies against the host registry and package
/// dependencies against the runtime environment.
pub struct DependencyChecker<'a> {
    runtime: &'a dyn Runtime,
    packages: &'a dyn PackageEnv,
    host_id: &'a str,
}

impl<'a> DependencyChecker<'a> {
    pub fn new(runtime: &'a dyn Runtime, packages: &'a dyn PackageEnv, host_id: &'a str) -> Self {
        Self {
            runtime,
            packages,
            host_id,
        }
    }

    pub fn host_id(&self) -> &str {
        self.host_id
    }

    /// Check `target` against a requirement expression.
    ///
    /// The expression is parsed first, so a malformed requirement reports
    /// [`DependencyError::Invalid`] regardless of what is installed.
    pub fn check(&self, target: &DependencyTarget, requirement: &str) -> Result<(), DependencyError> {
        let parsed =
            VersionRequirement::parse(requirement).map_err(|source| DependencyError::Invalid {
                target: target.clone(),
                requirement: requirement.to_string(),
                source,
            })?;

        let found = match target {
            DependencyTarget::Plugin(id) => match self.plugin_version(id) {
                PluginPresence::Missing => None,
                // Loaded without a known version: nothing to compare against.
                PluginPresence::Unversioned => return Ok(()),
                PluginPresence::Loaded(version) => Some(version),
            },
            DependencyTarget::Package(name) => match self.packages.installed_version(name) {
                Some(version) => Some(version),
                // Installed under a version scheme we cannot compare.
                None if self.packages.is_installed(name) => return Ok(()),
                None => None,
            },
        };

        let Some(found) = found else {
            return Err(DependencyError::NotFound {
                target: target.clone(),
            });
        };

        if parsed.accept(&found) {
            Ok(())
        } else {
            Err(DependencyError::NotMet {
                target: target.clone(),
                requirement: requirement.to_string(),
                found,
            })
        }
    }

    /// Operation the planner should apply to `target`.
    pub fn operation(&self, target: &DependencyTarget, requirement: &str) -> DependencyOperation {
        operation_for(&self.check(target, requirement))
    }

    fn plugin_version(&self, id: &str) -> PluginPresence {
        let version = self.runtime.loaded_version(id);
        if id == self.host_id {
            // The host is always present, even when it does not report a version.
            return version.map_or(PluginPresence::Unversioned, PluginPresence::Loaded);
        }
        match version {
            Some(version) => PluginPresence::Loaded(version),
            None if self.runtime.is_loaded(id) => PluginPresence::Unversioned,
            None => PluginPresence::Missing,
        }
    }
}

enum PluginPresence {
    Missing,
    Unversioned,
    Loaded(Version),
}

/// A raw package requirement split into name and requirement expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub requirement: String,
}

/// Leading package name, optionally followed by `[extras]`.
#[allow(clippy::expect_used)]
static REQUIREMENT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(?:\[[^\]]*\])?\s*(.*)$")
        .expect("valid regex literal")
});

/// Split a raw requirement such as `requests>=2.0` into name and expression.
///
/// Environment markers after `;` are dropped. A requirement without an
/// operator means any version (`*`). The operator is the longest token
/// found right after the name.
pub fn parse_requirement(raw: &str) -> Result<Requirement, PluginError> {
    let malformed = || PluginError::MalformedRequirement {
        requirement: raw.to_string(),
    };

    let line = raw.split(';').next().unwrap_or_default();
    let captures = REQUIREMENT_NAME.captures(line).ok_or_else(malformed)?;
    let name = captures.get(1).map(|m| m.as_str()).ok_or_else(malformed)?;
    let rest = captures.get(2).map_or("", |m| m.as_str().trim());

    let requirement = if rest.is_empty() || rest == Operator::Any.as_str() {
        Operator::Any.as_str().to_string()
    } else if Operator::match_prefix(rest).is_some() {
        rest.to_string()
    } else {
        return Err(malformed());
    };

    Ok(Requirement {
        name: name.to_string(),
        requirement,
    })
}
