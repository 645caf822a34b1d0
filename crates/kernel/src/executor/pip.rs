//! Snapshot of the packages installed in a Python environment.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{PackageEnv, normalize_package_name};
use crate::version::Version;

#[derive(Debug, Deserialize)]
struct PipListEntry {
    name: String,
    version: String,
}

/// Installed package versions, keyed by normalized package name.
///
/// A package whose version does not parse (`2023.3.post1`, `1.0.dev0`) is
/// kept as installed without a version.
#[derive(Debug, Default, Clone)]
pub struct PipEnvironment {
    packages: HashMap<String, Option<Version>>,
}

impl PipEnvironment {
    /// Run `python -m pip list --format=json` and record the result.
    pub async fn load(python: &Path, timeout: Duration) -> Result<Self> {
        let output = tokio::time::timeout(
            timeout,
            tokio::process::Command::new(python)
                .args(["-m", "pip", "list", "--format=json"])
                .output(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("pip list timed out after {timeout:?}"))?
        .context("failed to execute pip list")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("pip list failed: {}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::from_pip_list(&stdout)
    }

    /// Parse the JSON printed by `pip list --format=json`.
    ///
    /// Packages whose version does not parse are recorded without one.
    pub fn from_pip_list(json: &str) -> Result<Self> {
        let entries: Vec<PipListEntry> =
            serde_json::from_str(json).context("failed to parse pip list output")?;

        let mut packages = HashMap::with_capacity(entries.len());
        for entry in entries {
            let version = match Version::parse(&entry.version) {
                Ok(version) => Some(version),
                Err(e) => {
                    warn!(
                        package = %entry.name,
                        version = %entry.version,
                        error = %e,
                        "unparseable package version, treating it as unversioned"
                    );
                    None
                }
            };
            packages.insert(normalize_package_name(&entry.name), version);
        }

        debug!(count = packages.len(), "package environment loaded");
        Ok(Self { packages })
    }

    /// Build a snapshot from known name/version pairs.
    pub fn from_versions<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = (S, Version)>,
        S: AsRef<str>,
    {
        Self {
            packages: versions
                .into_iter()
                .map(|(name, version)| (normalize_package_name(name.as_ref()), Some(version)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl PackageEnv for PipEnvironment {
    fn installed_version(&self, name: &str) -> Option<Version> {
        self.packages
            .get(&normalize_package_name(name))
            .cloned()
            .flatten()
    }

    fn is_installed(&self, name: &str) -> bool {
        self.packages.contains_key(&normalize_package_name(name))
    }
}
