//! Request entry points for one user-facing session.
//!
//! A [`Session`] validates requests, builds tasks and owns the single
//! pending-task slot that a later confirmation executes.

use std::sync::Arc;

use tracing::debug;

use crate::plugin::gate::{self, Action};
use crate::plugin::{OutdatedPlugin, PluginError, outdated_plugins};
use crate::task::{
    Confirmation, InstallTask, ReplySink, TaskContext, TaskManager, UninstallTask,
};

pub struct Session {
    ctx: TaskContext,
    tasks: TaskManager,
}

impl Session {
    pub fn new(ctx: TaskContext) -> Self {
        Self {
            ctx,
            tasks: TaskManager::new(),
        }
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Plan installing (or upgrading) `ids` and keep the task pending.
    pub fn plan_install(
        &self,
        ids: &[String],
        upgrade: bool,
        reply: Arc<dyn ReplySink>,
    ) -> Result<(), PluginError> {
        let action = if upgrade { Action::Upgrade } else { Action::Install };
        let request = self.validate(action, ids, reply.as_ref())?;
        let task = InstallTask::new(self.ctx.clone(), request.ids, upgrade, reply);
        self.tasks.submit(Box::new(task))
    }

    /// Plan uninstalling `ids` and keep the task pending.
    pub fn plan_uninstall(&self, ids: &[String], reply: Arc<dyn ReplySink>) -> Result<(), PluginError> {
        let request = self.validate(Action::Uninstall, ids, reply.as_ref())?;
        let task = UninstallTask::new(self.ctx.clone(), request.ids, reply);
        self.tasks.submit(Box::new(task))
    }

    /// Execute the pending task, if any.
    pub fn confirm(&self, reply: &dyn ReplySink) -> Confirmation {
        self.tasks.confirm(reply)
    }

    /// Report every loaded plugin with a newer catalog version.
    pub fn check_updates(&self, reply: &dyn ReplySink) -> Vec<OutdatedPlugin> {
        let outdated = outdated_plugins(self.ctx.catalog.as_ref(), self.ctx.runtime.as_ref());
        if outdated.is_empty() {
            reply.emit("All plugins are up to date");
        } else {
            reply.emit(&format!("{} plugin(s) can be upgraded:", outdated.len()));
            for plugin in &outdated {
                reply.emit(&format!("  {} {} -> {}", plugin.id, plugin.local, plugin.latest));
            }
        }
        outdated
    }

    fn validate(
        &self,
        action: Action,
        ids: &[String],
        reply: &dyn ReplySink,
    ) -> Result<gate::TaskRequest, PluginError> {
        if self.tasks.is_executing() {
            let err = PluginError::TaskRunning;
            debug!(action = action.verb(), "request rejected while a task executes");
            reply.emit(&err.to_string());
            return Err(err);
        }

        gate::validate(
            action,
            ids,
            &self.ctx.self_id,
            self.ctx.catalog.as_ref(),
            self.ctx.runtime.as_ref(),
        )
        .inspect_err(|e| {
            debug!(action = action.verb(), error = %e, "request rejected");
            self.tasks.clear();
            reply.emit(&e.to_string());
        })
    }
}
