//! Host plugin registry.
//!
//! The [`Runtime`] trait is the kernel's view of the host that actually
//! loads plugins: which plugins are loaded, at which version, from which
//! file. Planning only reads it; tasks mutate it while executing.
//!
//! [`LocalRuntime`] is a directory-backed registry. Each installed plugin
//! is a file in the plugins directory plus a `{id}.info.toml` manifest
//! recording its id and version.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::manifest::{MANIFEST_SUFFIX, PluginManifest};
use crate::version::Version;

/// Read/write access to the host's loaded-plugin registry.
pub trait Runtime: Send + Sync {
    /// Ids of all loaded plugins (excluding the host itself).
    fn loaded_ids(&self) -> Vec<String>;

    /// Whether a plugin is currently loaded.
    fn is_loaded(&self, id: &str) -> bool;

    /// Version of a loaded plugin, or of the host when `id` is the host id.
    fn loaded_version(&self, id: &str) -> Option<Version>;

    /// Path of the file a loaded plugin was loaded from.
    fn plugin_file_path(&self, id: &str) -> Option<PathBuf>;

    /// Unload a plugin.
    fn unload(&self, id: &str) -> Result<()>;

    /// Pick up plugins added, replaced or removed on disk.
    fn reload_changed(&self) -> Result<()>;

    /// Record that `file` now holds `id` at `version`.
    ///
    /// Hosts that read metadata from the plugin file itself have nothing
    /// to record.
    fn record_install(&self, _id: &str, _version: &Version, _file: &Path) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LoadedPlugin {
    manifest: PluginManifest,
    path: PathBuf,
}

/// Directory-backed plugin registry.
pub struct LocalRuntime {
    plugins_dir: PathBuf,
    host: Option<(String, Version)>,
    loaded: RwLock<BTreeMap<String, LoadedPlugin>>,
}

impl LocalRuntime {
    /// Open the registry for `plugins_dir` and scan installed manifests.
    ///
    /// A missing directory is treated as an empty registry.
    pub fn open(plugins_dir: impl Into<PathBuf>) -> Result<Self> {
        let plugins_dir = plugins_dir.into();
        let loaded = discover_plugins(&plugins_dir)?;
        info!(
            plugins_dir = %plugins_dir.display(),
            count = loaded.len(),
            "plugin registry opened"
        );

        Ok(Self {
            plugins_dir,
            host: None,
            loaded: RwLock::new(loaded),
        })
    }

    /// Report `version` for the host id.
    pub fn with_host(mut self, id: impl Into<String>, version: Version) -> Self {
        self.host = Some((id.into(), version));
        self
    }

    fn is_host(&self, id: &str) -> bool {
        self.host.as_ref().is_some_and(|(host_id, _)| host_id == id)
    }
}

impl Runtime for LocalRuntime {
    fn loaded_ids(&self) -> Vec<String> {
        self.loaded.read().keys().cloned().collect()
    }

    fn is_loaded(&self, id: &str) -> bool {
        self.is_host(id) || self.loaded.read().contains_key(id)
    }

    fn loaded_version(&self, id: &str) -> Option<Version> {
        if let Some((host_id, version)) = &self.host
            && host_id == id
        {
            return Some(version.clone());
        }
        self.loaded
            .read()
            .get(id)
            .map(|plugin| plugin.manifest.version.clone())
    }

    fn plugin_file_path(&self, id: &str) -> Option<PathBuf> {
        self.loaded.read().get(id).map(|plugin| plugin.path.clone())
    }

    fn unload(&self, id: &str) -> Result<()> {
        let Some(plugin) = self.loaded.write().remove(id) else {
            debug!(plugin = %id, "unload requested for plugin that is not loaded");
            return Ok(());
        };

        let manifest_path = self.plugins_dir.join(PluginManifest::file_name(id));
        if manifest_path.exists() {
            std::fs::remove_file(&manifest_path).with_context(|| {
                format!("failed to remove manifest {}", manifest_path.display())
            })?;
        }

        info!(plugin = %id, version = %plugin.manifest.version, "plugin unloaded");
        Ok(())
    }

    fn reload_changed(&self) -> Result<()> {
        let fresh = discover_plugins(&self.plugins_dir)?;
        let mut loaded = self.loaded.write();

        let added = fresh.keys().filter(|id| !loaded.contains_key(*id)).count();
        let removed = loaded.keys().filter(|id| !fresh.contains_key(*id)).count();
        let changed = fresh
            .iter()
            .filter(|(id, plugin)| {
                loaded
                    .get(*id)
                    .is_some_and(|old| old.manifest.version != plugin.manifest.version)
            })
            .count();

        *loaded = fresh;
        info!(added, removed, changed, "plugin registry reloaded");
        Ok(())
    }

    fn record_install(&self, id: &str, version: &Version, file: &Path) -> Result<()> {
        let file_name = file
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("invalid plugin file path {}", file.display()))?;

        let manifest = PluginManifest {
            id: id.to_string(),
            version: version.clone(),
            file: file_name.to_string(),
        };
        let manifest_path = self.plugins_dir.join(PluginManifest::file_name(id));
        std::fs::write(&manifest_path, manifest.to_toml()?)
            .with_context(|| format!("failed to write manifest {}", manifest_path.display()))?;

        debug!(plugin = %id, %version, file = %file_name, "recorded plugin install");
        Ok(())
    }
}

/// Scan a plugins directory for installed manifests.
///
/// Manifests that fail to parse, whose id does not match the file name,
/// or whose plugin file is missing are skipped with a warning.
fn discover_plugins(plugins_dir: &Path) -> Result<BTreeMap<String, LoadedPlugin>> {
    let mut discovered = BTreeMap::new();

    if !plugins_dir.exists() {
        info!(
            ?plugins_dir,
            "plugins directory does not exist, nothing to discover"
        );
        return Ok(discovered);
    }

    let mut manifests: Vec<_> = std::fs::read_dir(plugins_dir)
        .with_context(|| {
            format!(
                "failed to read plugins directory: {}",
                plugins_dir.display()
            )
        })?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file()
                && e.file_name()
                    .to_str()
                    .is_some_and(|n| n.ends_with(MANIFEST_SUFFIX))
        })
        .collect();

    // Sort for deterministic discovery order
    manifests.sort_by_key(|e| e.file_name());

    for entry in manifests {
        let manifest_path = entry.path();
        let manifest = match PluginManifest::parse(&manifest_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(path = %manifest_path.display(), error = %e, "failed to parse plugin manifest");
                continue;
            }
        };

        if entry.file_name().to_str() != Some(PluginManifest::file_name(&manifest.id).as_str()) {
            warn!(
                path = %manifest_path.display(),
                id = %manifest.id,
                "manifest id does not match its file name, skipping"
            );
            continue;
        }

        let path = plugins_dir.join(&manifest.file);
        if !path.is_file() {
            warn!(plugin = %manifest.id, path = %path.display(), "plugin file missing, skipping");
            continue;
        }

        discovered.insert(manifest.id.clone(), LoadedPlugin { manifest, path });
    }

    Ok(discovered)
}
