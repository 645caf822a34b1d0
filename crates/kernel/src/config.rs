//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Default catalog document location.
pub const DEFAULT_CATALOG_SOURCE: &str =
    "https://raw.githubusercontent.com/MCDReforged/PluginCatalogue/meta/everything.json";

/// File name of the cached catalog document inside the data directory.
pub const CATALOG_CACHE_FILE: &str = "everything.json";

/// Plugin manager configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Catalog document URL.
    pub catalog_source: String,

    /// Directory holding the cached catalog (default: ./mpm).
    pub data_dir: PathBuf,

    /// Plugin installation directory (default: ./plugins).
    pub plugins_dir: PathBuf,

    /// Timeout for each network request or subprocess (default: 15s).
    pub timeout: Duration,

    /// Asset URL template, `{url}` is replaced by the release URL.
    pub download_url_template: String,

    /// Python interpreter used to run pip (default: python3).
    pub python: PathBuf,

    /// Id of the host runtime, both as plugin id and package name.
    pub host_id: String,

    /// Id of the plugin manager itself.
    pub self_id: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let catalog_source = var("MPM_CATALOG_SOURCE", DEFAULT_CATALOG_SOURCE);
        let data_dir = PathBuf::from(var("MPM_DATA_DIR", "./mpm"));
        let plugins_dir = PathBuf::from(var("MPM_PLUGINS_DIR", "./plugins"));

        let timeout_secs: u64 = var("MPM_TIMEOUT_SECS", "15")
            .parse()
            .context("MPM_TIMEOUT_SECS must be a valid number of seconds")?;

        let download_url_template = var("MPM_DOWNLOAD_URL_TEMPLATE", "{url}");
        if !download_url_template.contains("{url}") {
            anyhow::bail!("MPM_DOWNLOAD_URL_TEMPLATE must contain '{{url}}'");
        }

        let python = PathBuf::from(var("MPM_PYTHON", "python3"));
        let host_id = var("MPM_HOST_ID", "mcdreforged");
        let self_id = var("MPM_SELF_ID", "mcdreforged_plugin_manager");

        Ok(Self {
            catalog_source,
            data_dir,
            plugins_dir,
            timeout: Duration::from_secs(timeout_secs),
            download_url_template,
            python,
            host_id,
            self_id,
        })
    }

    /// Path of the cached catalog document.
    pub fn catalog_cache_path(&self) -> PathBuf {
        self.data_dir.join(CATALOG_CACHE_FILE)
    }
}
