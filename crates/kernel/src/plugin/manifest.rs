//! Parser for installed plugin `{id}.info.toml` manifests.
//!
//! [`LocalRuntime`](super::LocalRuntime) keeps one manifest per installed
//! plugin next to the plugin file. The manifest declares:
//! - id and installed version
//! - the plugin file name inside the plugins directory

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Suffix of installed plugin manifests.
pub const MANIFEST_SUFFIX: &str = ".info.toml";

/// Installed plugin metadata parsed from `{id}.info.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin id (must match the manifest file name).
    pub id: String,

    /// Installed version.
    pub version: Version,

    /// Plugin file name, relative to the plugins directory.
    pub file: String,
}

impl PluginManifest {
    /// Manifest file name for a plugin id.
    pub fn file_name(id: &str) -> String {
        format!("{id}{MANIFEST_SUFFIX}")
    }

    /// Parse a manifest file from the given path.
    pub fn parse(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plugin manifest: {}", path.display()))?;

        Self::parse_str(&content, path)
    }

    /// Parse a manifest from a TOML string.
    pub fn parse_str(content: &str, path: &Path) -> Result<Self> {
        let manifest: PluginManifest = toml::from_str(content)
            .with_context(|| format!("failed to parse plugin manifest at {}", path.display()))?;

        manifest.validate(path)?;
        Ok(manifest)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).context("failed to serialize plugin manifest")
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.id.is_empty() {
            anyhow::bail!("plugin manifest at {} has empty 'id' field", path.display());
        }

        if self.file.is_empty() {
            anyhow::bail!(
                "plugin '{}' at {} has empty 'file' field",
                self.id,
                path.display()
            );
        }

        // The file must live directly inside the plugins directory.
        if self.file.contains(['/', '\\']) || self.file == ".." {
            anyhow::bail!(
                "plugin '{}' at {} has a 'file' outside the plugins directory: {}",
                self.id,
                path.display(),
                self.file
            );
        }

        Ok(())
    }
}
