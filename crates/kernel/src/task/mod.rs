//! Two-phase install, upgrade and uninstall tasks.
//!
//! A task is planned first, without side effects, and shown to the user.
//! Only an explicit confirmation through the [`TaskManager`] executes it.
//!
//! ```text
//! Created -> Planning -> AwaitingConfirmation -> Executing -> Succeeded
//!                     \-> Rejected                        \-> PartiallyFailed
//! ```

mod install;
mod manager;
mod plan;
mod reply;
mod uninstall;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

pub use install::InstallTask;
pub use manager::{Confirmation, TaskManager};
pub use plan::{Operation, OperationKind, Plan, PlanBuilder};
pub use reply::{CollectingReply, ConsoleReply, ReplySink};
pub use uninstall::{UninstallTask, order_for_removal};

use crate::executor::{Executor, PackageEnv};
use crate::plugin::gate::Action;
use crate::plugin::{Catalog, DependencyChecker, PluginError, Runtime};

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Planning,
    AwaitingConfirmation,
    Rejected,
    Executing,
    Succeeded,
    PartiallyFailed,
}

/// A planned unit of work waiting for confirmation.
#[async_trait]
pub trait Task: Send {
    fn action(&self) -> Action;

    fn state(&self) -> TaskState;

    /// Compute the plan and present it. On error the task is rejected and
    /// the reason has already been reported to the user.
    fn plan(&mut self) -> Result<(), PluginError>;

    /// Run every planned operation in order.
    async fn execute(&mut self) -> TaskState;
}

/// Shared collaborators every task works with.
#[derive(Clone)]
pub struct TaskContext {
    pub catalog: Arc<dyn Catalog>,
    pub runtime: Arc<dyn Runtime>,
    pub packages: Arc<dyn PackageEnv>,
    pub executor: Arc<dyn Executor>,
    /// Id of the host runtime (a plugin id and a package name).
    pub host_id: String,
    /// Id of the plugin manager itself.
    pub self_id: String,
    /// Directory new plugins are downloaded into.
    pub install_dir: PathBuf,
    /// Asset URL template; `{url}` is replaced with the original URL.
    pub download_url_template: String,
}

impl TaskContext {
    pub fn checker(&self) -> DependencyChecker<'_> {
        DependencyChecker::new(self.runtime.as_ref(), self.packages.as_ref(), &self.host_id)
    }

    /// Apply the download template to an asset URL.
    pub fn download_url(&self, url: &str) -> String {
        self.download_url_template.replace("{url}", url)
    }
}
