//! Request validation run before a task is built.
//!
//! Each action has a fixed, ordered list of checks. The first failing
//! check rejects the whole request; a request that passes every check
//! comes out as a deduplicated [`TaskRequest`]. The plugin manager is
//! dropped from every batch before anything else is looked at.

use std::collections::HashSet;

use super::catalog::Catalog;
use super::error::PluginError;
use super::runtime::Runtime;

/// What a request asks to do with its plugin ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Upgrade,
    Uninstall,
}

impl Action {
    /// Verb used in user-facing messages.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Uninstall => "uninstall",
        }
    }

    fn checks(&self) -> &'static [Check] {
        match self {
            Self::Install => &[
                Check::NotEmpty,
                Check::NotSelf,
                Check::CatalogLoaded,
                Check::InCatalog,
            ],
            Self::Upgrade => &[
                Check::NotEmpty,
                Check::NotSelf,
                Check::CatalogLoaded,
                Check::Installed,
                Check::InCatalog,
            ],
            Self::Uninstall => &[Check::NotEmpty, Check::NotSelf, Check::Installed],
        }
    }
}

/// A single validation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    NotEmpty,
    /// Drops the plugin manager, rejecting a batch that names only it.
    NotSelf,
    CatalogLoaded,
    InCatalog,
    Installed,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub action: Action,
    /// Requested ids, deduplicated, in request order.
    pub ids: Vec<String>,
}

/// Validate a request for `action` on `ids`. `self_id` is the plugin
/// manager's own id.
pub fn validate(
    action: Action,
    ids: &[String],
    self_id: &str,
    catalog: &dyn Catalog,
    runtime: &dyn Runtime,
) -> Result<TaskRequest, PluginError> {
    let mut seen = HashSet::new();
    let mut ids: Vec<String> = ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .map(str::to_string)
        .collect();

    for check in action.checks() {
        match check {
            Check::NotEmpty => {
                if ids.is_empty() {
                    return Err(PluginError::NothingToDo);
                }
            }
            Check::NotSelf => {
                if ids.iter().any(|id| id == self_id) {
                    if ids.len() == 1 {
                        return Err(PluginError::self_target(self_id, action.verb()));
                    }
                    ids.retain(|id| id != self_id);
                }
            }
            Check::CatalogLoaded => {
                if !catalog.is_loaded() {
                    return Err(PluginError::CatalogNotLoaded);
                }
            }
            Check::InCatalog => {
                if let Some(id) = ids.iter().find(|id| catalog.get(id).is_none()) {
                    return Err(PluginError::unknown_plugin(id.as_str()));
                }
            }
            Check::Installed => {
                if let Some(id) = ids.iter().find(|id| !runtime.is_loaded(id)) {
                    return Err(PluginError::not_installed(id.as_str()));
                }
            }
        }
    }

    Ok(TaskRequest { action, ids })
}
