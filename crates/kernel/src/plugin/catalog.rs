//! Read-only catalog of available plugins.
//!
//! [`CatalogStore`] holds the records of a catalog document cached on disk
//! (`everything.json`). Refreshing downloads a new document to a temporary
//! file, swaps it over the cache and reloads.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::meta::{CatalogDocument, PluginRecord};

/// Lookup of known plugin metadata keyed by id.
pub trait Catalog: Send + Sync {
    /// Record for a plugin id.
    fn get(&self, id: &str) -> Option<Arc<PluginRecord>>;

    /// Every known plugin id, sorted.
    fn all_ids(&self) -> Vec<String>;

    /// Whether a catalog document has been loaded successfully.
    fn is_loaded(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct CatalogState {
    records: HashMap<String, Arc<PluginRecord>>,
    loaded: bool,
}

/// Catalog backed by a cached JSON document.
pub struct CatalogStore {
    cache_path: PathBuf,
    state: RwLock<CatalogState>,
}

impl CatalogStore {
    /// Create an empty, not-yet-loaded store for `cache_path`.
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            state: RwLock::new(CatalogState::default()),
        }
    }

    /// Build a loaded store straight from a document string.
    pub fn from_document(document: &str) -> Result<Self> {
        let store = Self::new(PathBuf::new());
        store.load_str(document)?;
        Ok(store)
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load the cached document from disk.
    ///
    /// On failure the previous records are dropped and the store reports
    /// itself as not loaded.
    pub fn load(&self) -> Result<usize> {
        let result = std::fs::read_to_string(&self.cache_path)
            .with_context(|| {
                format!(
                    "failed to read catalog cache {}",
                    self.cache_path.display()
                )
            })
            .and_then(|content| self.load_str(&content));

        if let Err(e) = &result {
            warn!(path = %self.cache_path.display(), error = %e, "failed to load catalog");
            *self.state.write() = CatalogState::default();
        }
        result
    }

    /// Replace the records with the plugins of `document`.
    ///
    /// Entries that fail to parse are skipped with a warning.
    pub fn load_str(&self, document: &str) -> Result<usize> {
        let document: CatalogDocument =
            serde_json::from_str(document).context("failed to parse catalog document")?;

        let mut records = HashMap::with_capacity(document.plugins.len());
        for (key, value) in document.plugins {
            match serde_json::from_value::<PluginRecord>(value) {
                Ok(record) => {
                    records.insert(record.meta.id.clone(), Arc::new(record));
                }
                Err(e) => {
                    warn!(plugin = %key, error = %e, "skipping malformed catalog entry");
                }
            }
        }

        let count = records.len();
        *self.state.write() = CatalogState {
            records,
            loaded: true,
        };
        debug!(count, "catalog loaded");
        Ok(count)
    }

    /// Download the catalog document from `source`, replace the cache file
    /// and reload.
    pub async fn refresh(&self, source: &str, timeout: Duration) -> Result<usize> {
        info!(%source, "refreshing plugin catalog");
        let before = self.len();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        let body = client
            .get(source)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .with_context(|| format!("failed to download catalog from {source}"))?
            .bytes()
            .await
            .context("failed to read catalog response")?;

        if let Some(parent) = self.cache_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("failed to create catalog cache directory")?;
        }

        // The cache file is only ever replaced by a complete document.
        let tmp_path = self.cache_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &body)
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.cache_path)
            .await
            .with_context(|| format!("failed to replace {}", self.cache_path.display()))?;

        let count = self.load()?;
        info!(
            count,
            new = count.saturating_sub(before),
            "plugin catalog refreshed"
        );
        Ok(count)
    }
}

impl Catalog for CatalogStore {
    fn get(&self, id: &str) -> Option<Arc<PluginRecord>> {
        self.state.read().records.get(id).cloned()
    }

    fn all_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().records.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn is_loaded(&self) -> bool {
        self.state.read().loaded
    }
}
