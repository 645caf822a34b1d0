//! Install and upgrade tasks.
//!
//! Planning resolves the requested plugins and their missing dependencies
//! into a [`Plan`]. Execution downloads plugin files, installs packages
//! through the executor and reloads the host once at the end.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::plan::{Operation, OperationKind, Plan, PlanBuilder};
use super::{ReplySink, Task, TaskContext, TaskState};
use crate::plugin::gate::Action;
use crate::plugin::{DependencyTarget, PluginError, check_update};

/// Installs or upgrades plugins together with their missing dependencies.
pub struct InstallTask {
    ctx: TaskContext,
    reply: Arc<dyn ReplySink>,
    ids: Vec<String>,
    upgrade: bool,
    state: TaskState,
    plan: Plan,
}

impl InstallTask {
    pub fn new(ctx: TaskContext, ids: Vec<String>, upgrade: bool, reply: Arc<dyn ReplySink>) -> Self {
        Self {
            ctx,
            reply,
            ids,
            upgrade,
            state: TaskState::Created,
            plan: Plan::default(),
        }
    }

    fn build_plan(&mut self) -> Result<Plan, PluginError> {
        let mut builder = PlanBuilder::new(self.ctx.catalog.as_ref(), self.ctx.checker());
        for id in &self.ids {
            if self.ctx.runtime.is_loaded(id) {
                if !self.upgrade {
                    self.reply.emit(&format!("Plugin '{id}' is already installed"));
                }
                let record = self
                    .ctx
                    .catalog
                    .get(id)
                    .ok_or_else(|| PluginError::unknown_plugin(id.as_str()))?;
                let status = check_update(&record, self.ctx.runtime.as_ref());
                if status.is_latest {
                    self.reply.emit(&format!("Plugin '{id}' is already up to date"));
                    continue;
                }
                self.reply.emit(&format!(
                    "A newer version of '{id}' is available: {}",
                    status.latest_version
                ));
                self.upgrade = true;
            }

            let kind = if self.upgrade {
                OperationKind::Upgrade
            } else {
                OperationKind::Install
            };
            builder.request(id, kind)?;
        }

        let plan = builder.finish();
        if plan.is_empty() {
            return Err(PluginError::NothingToDo);
        }
        Ok(plan)
    }

    fn show_summary(&self) {
        let verb = if self.upgrade { "upgrade" } else { "install" };
        self.reply.emit(&format!(
            "The following operations are needed to {verb} {}:",
            self.plan.requested().join(", ")
        ));

        let plugins = format_targets(self.plan.plugin_operations());
        if !plugins.is_empty() {
            self.reply.emit(&format!("  plugins: {plugins}"));
        }
        let packages = format_targets(self.plan.package_operations());
        if !packages.is_empty() {
            self.reply.emit(&format!("  packages: {packages}"));
        }

        self.reply.emit("Confirm to continue");
    }

    async fn run(&self, operation: &Operation) -> Result<(), PluginError> {
        match &operation.target {
            DependencyTarget::Plugin(id) => self.run_plugin(id, operation.kind).await,
            DependencyTarget::Package(name) => {
                self.ctx
                    .executor
                    .invoke_package_install(name, operation.kind == OperationKind::Upgrade)
                    .await
            }
        }
    }

    async fn run_plugin(&self, id: &str, kind: OperationKind) -> Result<(), PluginError> {
        let record = self
            .ctx
            .catalog
            .get(id)
            .ok_or_else(|| PluginError::unknown_plugin(id))?;
        let target = format!("plugin '{id}'");
        let release = record
            .release
            .latest_release()
            .ok_or_else(|| PluginError::io(&target, anyhow::anyhow!("no release available")))?;

        let file_name = release.asset.name.as_str();
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name == ".." {
            return Err(PluginError::io(
                &target,
                anyhow::anyhow!("invalid asset file name '{file_name}'"),
            ));
        }
        let url = self.ctx.download_url(&release.asset.browser_download_url);
        let executor = &self.ctx.executor;

        let current = match kind {
            OperationKind::Upgrade => self.ctx.runtime.plugin_file_path(id),
            OperationKind::Install => None,
        };

        let dest = match current {
            Some(current) => {
                let dir = current.parent().unwrap_or(Path::new("."));
                let temp = dir.join(format!("{file_name}.temp"));
                let dest = dir.join(file_name);

                self.reply.emit(&format!("    downloading {file_name}"));
                executor.download_asset(&url, &temp).await?;
                self.reply
                    .emit(&format!("    removing {}", current.display()));
                executor.remove_file(&current).await?;
                executor.rename_file(&temp, &dest).await?;
                dest
            }
            None => {
                let dest = self.ctx.install_dir.join(file_name);
                self.reply.emit(&format!("    downloading {file_name}"));
                executor.download_asset(&url, &dest).await?;
                dest
            }
        };

        self.ctx
            .runtime
            .record_install(id, record.version(), &dest)
            .map_err(|e| PluginError::io(&target, e))?;

        info!(
            plugin = %id,
            version = %record.version(),
            file = %dest.display(),
            action = kind.verb(),
            "plugin file in place"
        );
        Ok(())
    }
}

fn format_targets<'a>(operations: impl Iterator<Item = &'a Operation>) -> String {
    operations
        .map(|op| match op.kind {
            OperationKind::Install => op.target.name().to_string(),
            OperationKind::Upgrade => format!("{} (upgrade)", op.target.name()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl Task for InstallTask {
    fn action(&self) -> Action {
        if self.upgrade { Action::Upgrade } else { Action::Install }
    }

    fn state(&self) -> TaskState {
        self.state
    }

    fn plan(&mut self) -> Result<(), PluginError> {
        self.state = TaskState::Planning;
        match self.build_plan() {
            Ok(plan) => {
                self.plan = plan;
                self.show_summary();
                self.state = TaskState::AwaitingConfirmation;
                Ok(())
            }
            Err(e) => {
                self.reply.emit(&e.to_string());
                self.state = TaskState::Rejected;
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> TaskState {
        self.state = TaskState::Executing;

        let mut failed = 0;
        for operation in self.plan.operations() {
            self.reply.emit(&format!(
                "{} {}",
                operation.kind.progressive(),
                operation.target
            ));
            if let Err(e) = self.run(operation).await {
                warn!(operation = %operation, error = %e, "operation failed");
                self.reply.emit(&format!("    {e}"));
                failed += 1;
            }
        }

        self.state = if failed == 0 {
            self.reply.emit("Reloading changed plugins");
            match self.ctx.runtime.reload_changed() {
                Ok(()) => {
                    self.reply.emit("Done");
                    TaskState::Succeeded
                }
                Err(e) => {
                    self.reply
                        .emit(&PluginError::io("plugin reload", e).to_string());
                    TaskState::PartiallyFailed
                }
            }
        } else {
            self.reply.emit(&format!(
                "{failed} of {} operations failed",
                self.plan.len()
            ));
            TaskState::PartiallyFailed
        };

        info!(state = ?self.state, operations = self.plan.len(), failed, "install task finished");
        self.state
    }
}
