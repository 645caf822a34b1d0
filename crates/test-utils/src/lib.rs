//! Plugin manager test utilities.
//!
//! Helpers for integration testing: catalog fixture builders, installed
//! plugin fixtures and assertion helpers for reply output.

use std::path::{Path, PathBuf};

use serde_json::{Value as JsonValue, json};

/// Base URL used for fixture download links.
pub const DOWNLOAD_BASE: &str = "https://example.invalid/releases";

/// Create a catalog entry with default values.
pub fn test_plugin(id: &str, version: &str) -> TestPlugin {
    TestPlugin {
        id: id.to_string(),
        version: version.to_string(),
        dependencies: Vec::new(),
        requirements: Vec::new(),
        labels: Vec::new(),
        description: None,
        asset: Some(format!("{id}-v{version}.mcdr")),
    }
}

/// A catalog entry builder for creating test fixtures.
#[derive(Debug, Clone)]
pub struct TestPlugin {
    pub id: String,
    pub version: String,
    pub dependencies: Vec<(String, String)>,
    pub requirements: Vec<String>,
    pub labels: Vec<String>,
    pub description: Option<String>,
    /// Asset file name of the latest release; `None` for no release.
    pub asset: Option<String>,
}

impl TestPlugin {
    /// Declare a plugin dependency.
    pub fn depends_on(mut self, id: &str, requirement: &str) -> Self {
        self.dependencies
            .push((id.to_string(), requirement.to_string()));
        self
    }

    /// Declare a raw package requirement such as `requests>=2.0`.
    pub fn requires(mut self, requirement: &str) -> Self {
        self.requirements.push(requirement.to_string());
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.labels.push(label.to_string());
        self
    }

    pub fn with_description(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    /// Set the asset file name of the latest release.
    pub fn with_asset(mut self, name: &str) -> Self {
        self.asset = Some(name.to_string());
        self
    }

    /// Publish no release at all.
    pub fn without_release(mut self) -> Self {
        self.asset = None;
        self
    }

    /// Download URL of the latest release asset.
    pub fn download_url(&self) -> Option<String> {
        self.asset
            .as_ref()
            .map(|name| format!("{DOWNLOAD_BASE}/{}/{name}", self.id))
    }

    /// Catalog JSON for this entry.
    pub fn to_json(&self) -> JsonValue {
        let dependencies: serde_json::Map<String, JsonValue> = self
            .dependencies
            .iter()
            .map(|(id, req)| (id.clone(), JsonValue::String(req.clone())))
            .collect();

        let mut description = serde_json::Map::new();
        if let Some(text) = &self.description {
            description.insert("en_us".to_string(), JsonValue::String(text.clone()));
        }

        let release = match (&self.asset, self.download_url()) {
            (Some(name), Some(url)) => json!({
                "id": self.id,
                "latest_version_index": 0,
                "releases": [{
                    "url": url,
                    "name": format!("v{}", self.version),
                    "tag_name": format!("v{}", self.version),
                    "created_at": "2024-01-01T00:00:00Z",
                    "asset": {
                        "name": name,
                        "size": 1024,
                        "download_count": 0,
                        "created_at": "2024-01-01T00:00:00Z",
                        "browser_download_url": url
                    },
                    "description": null,
                    "prerelease": false
                }]
            }),
            _ => json!({"id": self.id, "latest_version_index": null, "releases": []}),
        };

        json!({
            "meta": {
                "id": self.id,
                "name": self.id,
                "version": self.version,
                "repository": format!("https://example.invalid/{}", self.id),
                "labels": self.labels,
                "authors": ["tester"],
                "dependencies": dependencies,
                "requirements": self.requirements,
                "description": description
            },
            "release": release
        })
    }
}

/// Serialize a catalog document holding `plugins`.
pub fn catalog_document(plugins: &[TestPlugin]) -> String {
    let entries: serde_json::Map<String, JsonValue> = plugins
        .iter()
        .map(|plugin| (plugin.id.clone(), plugin.to_json()))
        .collect();
    json!({ "plugins": entries }).to_string()
}

/// Place an installed plugin file and its `.info.toml` manifest in `dir`.
///
/// Returns the path of the plugin file.
pub fn installed_plugin(dir: &Path, id: &str, version: &str) -> std::io::Result<PathBuf> {
    let file_name = format!("{id}-v{version}.mcdr");
    let path = dir.join(&file_name);
    std::fs::write(&path, format!("{id} {version}"))?;
    std::fs::write(
        dir.join(format!("{id}.info.toml")),
        installed_manifest(id, version, &file_name),
    )?;
    Ok(path)
}

/// TOML text of an installed-plugin manifest.
pub fn installed_manifest(id: &str, version: &str, file: &str) -> String {
    format!("id = \"{id}\"\nversion = \"{version}\"\nfile = \"{file}\"\n")
}

/// Assertion helpers for reply output.
pub mod assert {
    /// Assert that some message contains a substring.
    pub fn replied(messages: &[String], needle: &str) {
        assert!(
            messages.iter().any(|m| m.contains(needle)),
            "Expected a reply containing '{needle}'\nReplies:\n{}",
            messages.join("\n")
        );
    }

    /// Assert that no message contains a substring.
    pub fn not_replied(messages: &[String], needle: &str) {
        assert!(
            !messages.iter().any(|m| m.contains(needle)),
            "Expected no reply containing '{needle}'\nReplies:\n{}",
            messages.join("\n")
        );
    }
}
