//! Update status of installed plugins.
//!
//! Compares the version the host has loaded with the latest version in the
//! catalog.

use super::catalog::Catalog;
use super::meta::PluginRecord;
use super::runtime::Runtime;
use crate::version::Version;

/// Result of comparing a plugin's loaded version with the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckUpdateResult {
    /// Whether the loaded version is at least the catalog version.
    /// `false` when the plugin is not loaded at all.
    pub is_latest: bool,
    pub latest_version: Version,
    pub local_version: Option<Version>,
}

/// Compare the loaded version of `record` with its catalog version.
///
/// A plugin that is loaded without a known version is treated as up to
/// date, since there is nothing to compare.
pub fn check_update(record: &PluginRecord, runtime: &dyn Runtime) -> CheckUpdateResult {
    let latest_version = record.version().clone();
    let local_version = runtime.loaded_version(record.id());
    let is_latest = match &local_version {
        Some(local) => *local >= latest_version,
        None => runtime.is_loaded(record.id()),
    };

    CheckUpdateResult {
        is_latest,
        latest_version,
        local_version,
    }
}

/// A loaded plugin with a newer version in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedPlugin {
    pub id: String,
    pub local: Version,
    pub latest: Version,
}

/// Every loaded plugin whose catalog version is newer than the loaded one,
/// sorted by id.
pub fn outdated_plugins(catalog: &dyn Catalog, runtime: &dyn Runtime) -> Vec<OutdatedPlugin> {
    let mut ids = runtime.loaded_ids();
    ids.sort();

    ids.into_iter()
        .filter_map(|id| {
            let record = catalog.get(&id)?;
            let result = check_update(&record, runtime);
            match (result.is_latest, result.local_version) {
                (false, Some(local)) => Some(OutdatedPlugin {
                    id,
                    local,
                    latest: result.latest_version,
                }),
                _ => None,
            }
        })
        .collect()
}
