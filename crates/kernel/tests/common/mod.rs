#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! In-memory stand-ins for the host registry, the package environment and
//! the executor. Every side effect is recorded as a short event string so
//! tests can assert on the exact order of operations.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use mpm_kernel::executor::{Executor, PackageEnv};
use mpm_kernel::plugin::{CatalogStore, PluginError, Runtime};
use mpm_kernel::session::Session;
use mpm_kernel::task::{CollectingReply, ReplySink, TaskContext};
use mpm_kernel::version::Version;
use mpm_test_utils::{TestPlugin, catalog_document};

pub const HOST_ID: &str = "mcdreforged";
pub const SELF_ID: &str = "mcdreforged_plugin_manager";

pub fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

pub fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Shared, ordered log of side effects.
#[derive(Debug, Default, Clone)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

#[derive(Debug, Clone)]
struct FakePlugin {
    version: Option<Version>,
    path: PathBuf,
}

/// Host registry held in memory.
pub struct FakeRuntime {
    plugins: RwLock<BTreeMap<String, FakePlugin>>,
    failing_unloads: HashSet<String>,
    log: EventLog,
}

impl FakeRuntime {
    pub fn new(log: EventLog) -> Self {
        Self {
            plugins: RwLock::new(BTreeMap::new()),
            failing_unloads: HashSet::new(),
            log,
        }
    }

    /// Register a loaded plugin at `/plugins/{id}.mcdr`.
    pub fn with_plugin(self, id: &str, version: &str) -> Self {
        self.plugins.write().insert(
            id.to_string(),
            FakePlugin {
                version: Some(v(version)),
                path: PathBuf::from(format!("/plugins/{id}.mcdr")),
            },
        );
        self
    }

    pub fn failing_unload(mut self, id: &str) -> Self {
        self.failing_unloads.insert(id.to_string());
        self
    }
}

impl Runtime for FakeRuntime {
    fn loaded_ids(&self) -> Vec<String> {
        self.plugins.read().keys().cloned().collect()
    }

    fn is_loaded(&self, id: &str) -> bool {
        id == HOST_ID || self.plugins.read().contains_key(id)
    }

    fn loaded_version(&self, id: &str) -> Option<Version> {
        self.plugins.read().get(id).and_then(|p| p.version.clone())
    }

    fn plugin_file_path(&self, id: &str) -> Option<PathBuf> {
        self.plugins.read().get(id).map(|p| p.path.clone())
    }

    fn unload(&self, id: &str) -> anyhow::Result<()> {
        if self.failing_unloads.contains(id) {
            anyhow::bail!("plugin is busy");
        }
        self.plugins.write().remove(id);
        self.log.push(format!("unload {id}"));
        Ok(())
    }

    fn reload_changed(&self) -> anyhow::Result<()> {
        self.log.push("reload");
        Ok(())
    }

    fn record_install(&self, id: &str, version: &Version, file: &Path) -> anyhow::Result<()> {
        self.plugins.write().insert(
            id.to_string(),
            FakePlugin {
                version: Some(version.clone()),
                path: file.to_path_buf(),
            },
        );
        self.log.push(format!("record {id} {version}"));
        Ok(())
    }
}

/// Package environment held in memory.
#[derive(Default)]
pub struct FakePackages(HashMap<String, Option<Version>>);

impl FakePackages {
    pub fn with(mut self, name: &str, version: &str) -> Self {
        self.0.insert(name.to_string(), Some(v(version)));
        self
    }

    /// Installed with a version that does not parse.
    pub fn unversioned(mut self, name: &str) -> Self {
        self.0.insert(name.to_string(), None);
        self
    }
}

impl PackageEnv for FakePackages {
    fn installed_version(&self, name: &str) -> Option<Version> {
        self.0.get(name).cloned().flatten()
    }

    fn is_installed(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

/// Executor that records every call and fails on request.
pub struct RecordingExecutor {
    log: EventLog,
    failing: HashSet<String>,
    /// Write downloaded files to disk instead of only recording them.
    write_files: bool,
}

impl RecordingExecutor {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            failing: HashSet::new(),
            write_files: false,
        }
    }

    /// Actually create, move and delete files.
    pub fn writing_files(mut self) -> Self {
        self.write_files = true;
        self
    }

    /// Fail any call whose package name or URL contains `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.failing.insert(needle.to_string());
        self
    }

    fn should_fail(&self, subject: &str) -> bool {
        self.failing.iter().any(|needle| subject.contains(needle.as_str()))
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn download_asset(&self, url: &str, dest: &Path) -> Result<(), PluginError> {
        if self.should_fail(url) {
            return Err(PluginError::io(
                dest.display().to_string(),
                anyhow::anyhow!("connection refused"),
            ));
        }
        if self.write_files {
            std::fs::write(dest, url).map_err(|e| PluginError::io(dest.display().to_string(), e))?;
        }
        self.log.push(format!("download {url} -> {}", dest.display()));
        Ok(())
    }

    async fn invoke_package_install(&self, name: &str, upgrade: bool) -> Result<(), PluginError> {
        if self.should_fail(name) {
            return Err(PluginError::process(
                name,
                anyhow::anyhow!("pip exited with status 1"),
            ));
        }
        let flag = if upgrade { " -U" } else { "" };
        self.log.push(format!("pip install{flag} {name}"));
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<(), PluginError> {
        if self.write_files {
            std::fs::remove_file(path).map_err(|e| PluginError::io(path.display().to_string(), e))?;
        }
        self.log.push(format!("remove {}", path.display()));
        Ok(())
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> Result<(), PluginError> {
        if self.write_files {
            std::fs::rename(from, to).map_err(|e| PluginError::io(to.display().to_string(), e))?;
        }
        self.log.push(format!("rename {} -> {}", from.display(), to.display()));
        Ok(())
    }
}

/// A session wired to in-memory collaborators.
pub struct TestEnv {
    pub session: Session,
    pub log: EventLog,
    pub reply: CollectingReply,
}

impl TestEnv {
    pub fn reply_sink(&self) -> Arc<dyn ReplySink> {
        Arc::new(self.reply.clone())
    }

    pub fn messages(&self) -> Vec<String> {
        self.reply.messages()
    }
}

/// Builder for [`TestEnv`].
pub struct TestEnvBuilder {
    plugins: Vec<TestPlugin>,
    runtime: FakeRuntime,
    packages: FakePackages,
    executor: RecordingExecutor,
    log: EventLog,
    template: String,
}

impl TestEnvBuilder {
    pub fn new(plugins: &[TestPlugin]) -> Self {
        let log = EventLog::default();
        Self {
            plugins: plugins.to_vec(),
            runtime: FakeRuntime::new(log.clone()),
            packages: FakePackages::default(),
            executor: RecordingExecutor::new(log.clone()),
            log,
            template: "{url}".to_string(),
        }
    }

    pub fn runtime(mut self, f: impl FnOnce(FakeRuntime) -> FakeRuntime) -> Self {
        self.runtime = f(self.runtime);
        self
    }

    pub fn packages(mut self, f: impl FnOnce(FakePackages) -> FakePackages) -> Self {
        self.packages = f(self.packages);
        self
    }

    pub fn executor(mut self, f: impl FnOnce(RecordingExecutor) -> RecordingExecutor) -> Self {
        self.executor = f(self.executor);
        self
    }

    pub fn download_template(mut self, template: &str) -> Self {
        self.template = template.to_string();
        self
    }

    pub fn build(self) -> TestEnv {
        let catalog = CatalogStore::from_document(&catalog_document(&self.plugins)).unwrap();
        let ctx = TaskContext {
            catalog: Arc::new(catalog),
            runtime: Arc::new(self.runtime),
            packages: Arc::new(self.packages),
            executor: Arc::new(self.executor),
            host_id: HOST_ID.to_string(),
            self_id: SELF_ID.to_string(),
            install_dir: PathBuf::from("/plugins"),
            download_url_template: self.template,
        };

        TestEnv {
            session: Session::new(ctx),
            log: self.log,
            reply: CollectingReply::new(),
        }
    }
}
