//! Catalog metadata for available plugins.
//!
//! The catalog document is a JSON object keyed by plugin id:
//!
//! ```json
//! { "plugins": { "<id>": { "meta": { ... }, "release": { ... } } } }
//! ```
//!
//! `meta` describes the latest published version and its declared
//! dependencies; `release` lists the downloadable releases.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::version::Version;

/// Top-level catalog document with plugins kept as raw JSON so a single
/// malformed entry can be skipped instead of failing the whole load.
#[derive(Debug, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub plugins: HashMap<String, serde_json::Value>,
}

/// Published metadata of a plugin.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginMeta {
    /// Unique plugin id.
    pub id: String,

    /// Human-readable name.
    #[serde(default)]
    pub name: String,

    /// Latest published version.
    pub version: Version,

    #[serde(default)]
    pub repository: String,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub authors: Vec<String>,

    /// Plugin dependencies: plugin id to version requirement expression.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Raw package requirements such as `requests>=2.0`.
    #[serde(default)]
    pub requirements: Vec<String>,

    /// Description keyed by language code.
    #[serde(default)]
    pub description: HashMap<String, String>,
}

/// Downloadable file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub created_at: String,
    pub browser_download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub created_at: String,
    pub asset: AssetInfo,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
}

/// All releases of a plugin plus a pointer to the latest one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub latest_version_index: Option<usize>,
    #[serde(default)]
    pub releases: Vec<ReleaseInfo>,
}

impl ReleaseSummary {
    /// The latest release, if the catalog marks one.
    pub fn latest_release(&self) -> Option<&ReleaseInfo> {
        self.latest_version_index
            .and_then(|index| self.releases.get(index))
    }
}

/// A catalog entry: metadata plus release summary.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginRecord {
    pub meta: PluginMeta,
    #[serde(default)]
    pub release: ReleaseSummary,
}

impl PluginRecord {
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn version(&self) -> &Version {
        &self.meta.version
    }

    /// Whether this record declares a plugin dependency on `plugin_id`.
    pub fn depends_on(&self, plugin_id: &str) -> bool {
        self.meta.dependencies.contains_key(plugin_id)
    }

    /// Description in `language`, falling back to any available text.
    pub fn description(&self, language: &str) -> Option<&str> {
        self.meta
            .description
            .get(language)
            .or_else(|| self.meta.description.values().next())
            .map(String::as_str)
    }

    /// Whether the record carries one of `labels`. No labels matches all.
    pub fn has_any_label(&self, labels: &[String]) -> bool {
        labels.is_empty() || self.meta.labels.iter().any(|label| labels.contains(label))
    }

    /// Whether `query` occurs in the id, the name or any description,
    /// ignoring case.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.meta.id.to_lowercase().contains(&query)
            || self.meta.name.to_lowercase().contains(&query)
            || self
                .meta
                .description
                .values()
                .any(|text| text.to_lowercase().contains(&query))
    }
}
