//! Plugin metadata, registry access and dependency checks.
//!
//! This module handles:
//! - Loading the plugin catalog and its release metadata
//! - Reading the host's loaded-plugin registry
//! - Checking plugin and package dependencies
//! - Validating requests before a task is planned

mod catalog;
pub mod cli;
mod dependency;
mod error;
pub mod gate;
mod manifest;
mod meta;
mod runtime;
mod status;

pub use catalog::{Catalog, CatalogStore};
pub use dependency::{
    DependencyChecker, DependencyError, DependencyOperation, DependencyTarget, Requirement,
    operation_for, parse_requirement,
};
pub use error::PluginError;
pub use manifest::{MANIFEST_SUFFIX, PluginManifest};
pub use meta::{AssetInfo, CatalogDocument, PluginMeta, PluginRecord, ReleaseInfo, ReleaseSummary};
pub use runtime::{LocalRuntime, Runtime};
pub use status::{CheckUpdateResult, OutdatedPlugin, check_update, outdated_plugins};
