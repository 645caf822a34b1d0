//! Executor backed by HTTP downloads and a `pip` subprocess.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info};

use super::Executor;
use crate::plugin::PluginError;

/// Runs plan operations against the real filesystem, network and
/// Python environment. Every network or subprocess call is bounded by
/// `timeout`.
pub struct SystemExecutor {
    client: reqwest::Client,
    python: PathBuf,
    timeout: Duration,
}

impl SystemExecutor {
    pub fn new(python: impl Into<PathBuf>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            python: python.into(),
            timeout,
        })
    }

    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("download of {url} failed"))?;
        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {url}"))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Executor for SystemExecutor {
    async fn download_asset(&self, url: &str, dest: &Path) -> Result<(), PluginError> {
        let target = dest.display().to_string();
        debug!(%url, dest = %target, "downloading asset");

        let body = self
            .fetch(url)
            .await
            .map_err(|e| PluginError::io(&target, e))?;
        tokio::fs::write(dest, &body)
            .await
            .with_context(|| format!("failed to write {target}"))
            .map_err(|e| PluginError::io(&target, e))?;

        info!(%url, dest = %target, bytes = body.len(), "asset downloaded");
        Ok(())
    }

    async fn invoke_package_install(&self, name: &str, upgrade: bool) -> Result<(), PluginError> {
        let mut command = tokio::process::Command::new(&self.python);
        command.args(["-m", "pip", "install"]);
        if upgrade {
            command.arg("-U");
        }
        command.arg(name);

        info!(package = %name, upgrade, "invoking pip");
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                PluginError::process(
                    name,
                    anyhow::anyhow!("pip timed out after {:?}", self.timeout),
                )
            })?
            .context("failed to execute pip")
            .map_err(|e| PluginError::process(name, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(PluginError::process(
                name,
                anyhow::anyhow!("pip exited with {}: {}", output.status, last_line.trim()),
            ));
        }

        debug!(package = %name, "pip finished");
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<(), PluginError> {
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("failed to remove {}", path.display()))
            .map_err(|e| PluginError::io(path.display().to_string(), e))
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> Result<(), PluginError> {
        tokio::fs::rename(from, to)
            .await
            .with_context(|| format!("failed to move {} to {}", from.display(), to.display()))
            .map_err(|e| PluginError::io(to.display().to_string(), e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_operations() {
        let dir = tempfile::tempdir().unwrap();
        let executor = SystemExecutor::new("python3", Duration::from_secs(5)).unwrap();

        let from = dir.path().join("a.mcdr.temp");
        let to = dir.path().join("a.mcdr");
        std::fs::write(&from, b"new").unwrap();

        executor.rename_file(&from, &to).await.unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"new");

        executor.remove_file(&to).await.unwrap();
        assert!(!to.exists());

        let err = executor.remove_file(&to).await.unwrap_err();
        assert!(err.to_string().contains("a.mcdr"));
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_process_error() {
        let executor =
            SystemExecutor::new("/nonexistent/python", Duration::from_secs(5)).unwrap();
        let err = executor
            .invoke_package_install("requests", false)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Process { .. }));
        assert!(err.to_string().starts_with("package 'requests'"));
    }
}
