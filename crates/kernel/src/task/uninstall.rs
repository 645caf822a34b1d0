//! Uninstall task and removal ordering.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{ReplySink, Task, TaskContext, TaskState};
use crate::plugin::PluginError;
use crate::plugin::gate::Action;

/// Order a removal batch so every plugin comes after the plugins in the
/// same batch that depend on it.
///
/// `dependents(id)` lists the plugins that depend on `id`; dependents
/// outside the batch are ignored. Ties keep request order. Plugins caught
/// in a dependency cycle are appended in request order.
pub fn order_for_removal<F>(ids: &[String], dependents: F) -> Vec<String>
where
    F: Fn(&str) -> Vec<String>,
{
    let index: HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    // blocked_by[x] = in-batch dependents of x that must be removed first
    let mut blocked_by = vec![0usize; ids.len()];
    // depends_on[y] = in-batch plugins that y depends on
    let mut depends_on: Vec<Vec<usize>> = vec![Vec::new(); ids.len()];

    for (x, id) in ids.iter().enumerate() {
        let mut seen = BTreeSet::new();
        for dependent in dependents(id) {
            if let Some(&y) = index.get(dependent.as_str())
                && y != x
                && seen.insert(y)
            {
                blocked_by[x] += 1;
                depends_on[y].push(x);
            }
        }
    }

    // Kahn's algorithm with request order as tie-breaker
    let mut ready: BTreeSet<usize> = (0..ids.len()).filter(|&i| blocked_by[i] == 0).collect();
    let mut order = Vec::with_capacity(ids.len());
    let mut placed = vec![false; ids.len()];

    while let Some(next) = ready.pop_first() {
        order.push(ids[next].clone());
        placed[next] = true;
        for &dependency in &depends_on[next] {
            blocked_by[dependency] -= 1;
            if blocked_by[dependency] == 0 {
                ready.insert(dependency);
            }
        }
    }

    if order.len() != ids.len() {
        let in_cycle: Vec<&str> = ids
            .iter()
            .enumerate()
            .filter(|(i, _)| !placed[*i])
            .map(|(_, id)| id.as_str())
            .collect();
        warn!(
            plugins = %in_cycle.join(", "),
            "circular dependency in removal batch, keeping request order"
        );
        order.extend(in_cycle.into_iter().map(str::to_string));
    }

    order
}

/// Unloads and deletes plugins, dependents first.
pub struct UninstallTask {
    ctx: TaskContext,
    reply: Arc<dyn ReplySink>,
    ids: Vec<String>,
    state: TaskState,
    order: Vec<String>,
}

impl UninstallTask {
    pub fn new(ctx: TaskContext, ids: Vec<String>, reply: Arc<dyn ReplySink>) -> Self {
        Self {
            ctx,
            reply,
            ids,
            state: TaskState::Created,
            order: Vec::new(),
        }
    }

    /// Loaded plugins whose catalog record declares a dependency on `id`.
    fn dependents_of(&self, id: &str) -> Vec<String> {
        let mut dependents: Vec<String> = self
            .ctx
            .runtime
            .loaded_ids()
            .into_iter()
            .filter(|other| other != id)
            .filter(|other| {
                self.ctx
                    .catalog
                    .get(other)
                    .is_some_and(|record| record.depends_on(id))
            })
            .collect();
        dependents.sort();
        dependents
    }

    fn build_order(&mut self) -> Result<(), PluginError> {
        if self.ids.is_empty() {
            return Err(PluginError::NothingToDo);
        }
        self.order = order_for_removal(&self.ids, |id| self.dependents_of(id));
        Ok(())
    }

    fn show_summary(&self) {
        self.reply.emit(&format!(
            "The following plugins will be uninstalled: {}",
            self.order.join(", ")
        ));

        for id in &self.order {
            let external: Vec<String> = self
                .dependents_of(id)
                .into_iter()
                .filter(|dependent| !self.order.contains(dependent))
                .collect();
            if !external.is_empty() {
                warn!(plugin = %id, dependents = %external.join(", "), "uninstalling a plugin other plugins depend on");
                self.reply.emit(&format!(
                    "Warning: these plugins depend on '{id}': {}",
                    external.join(", ")
                ));
            }
        }

        self.reply.emit("Confirm to continue");
    }

    async fn remove(&self, id: &str) -> Result<(), PluginError> {
        let path = self.ctx.runtime.plugin_file_path(id);

        self.reply.emit(&format!("Unloading plugin '{id}'"));
        self.ctx
            .runtime
            .unload(id)
            .map_err(|e| PluginError::io(format!("plugin '{id}'"), e))?;

        let Some(path) = path else {
            return Err(PluginError::io(
                format!("plugin '{id}'"),
                anyhow::anyhow!("plugin file not known"),
            ));
        };
        self.reply.emit(&format!("Removing file {}", path.display()));
        self.ctx.executor.remove_file(&path).await
    }
}

#[async_trait]
impl Task for UninstallTask {
    fn action(&self) -> Action {
        Action::Uninstall
    }

    fn state(&self) -> TaskState {
        self.state
    }

    fn plan(&mut self) -> Result<(), PluginError> {
        self.state = TaskState::Planning;
        match self.build_order() {
            Ok(()) => {
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
        for id in &self.order {
            if let Err(e) = self.remove(id).await {
                warn!(plugin = %id, error = %e, "uninstall step failed");
                self.reply.emit(&format!("    {e}"));
                failed += 1;
            }
        }

        self.reply.emit("Reloading changed plugins");
        if let Err(e) = self.ctx.runtime.reload_changed() {
            self.reply
                .emit(&PluginError::io("plugin reload", e).to_string());
            failed += 1;
        }

        self.state = if failed == 0 {
            self.reply.emit("Done");
            TaskState::Succeeded
        } else {
            self.reply.emit("Uninstall finished with errors");
            TaskState::PartiallyFailed
        };

        info!(state = ?self.state, plugins = self.order.len(), failed, "uninstall task finished");
        self.state
    }
}
