//! The single pending-task slot of a session.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{ReplySink, Task, TaskState};
use crate::plugin::PluginError;
use crate::plugin::gate::Action;

/// Outcome of [`TaskManager::confirm`].
#[derive(Debug)]
pub enum Confirmation {
    /// No task was pending.
    NothingToConfirm,
    /// A confirmed task is still executing.
    Busy,
    /// The pending task is executing; the handle resolves to its final state.
    Started(JoinHandle<TaskState>),
}

#[derive(Default)]
enum Slot {
    #[default]
    Empty,
    Pending(Box<dyn Task>),
    Executing,
}

/// Resets the slot once the executing task is done or dropped.
struct ExecutionGuard(Arc<Mutex<Slot>>);

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        *self.0.lock() = Slot::Empty;
    }
}

/// Holds at most one planned task until it is confirmed.
///
/// Submitting replaces any pending task. Confirming moves the slot to
/// executing and runs the task in the background; the slot stays occupied
/// until that execution finishes, and new submissions are rejected
/// meanwhile.
#[derive(Default)]
pub struct TaskManager {
    slot: Arc<Mutex<Slot>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan `task` and keep it pending when planning succeeds.
    ///
    /// The previous pending task, if any, is discarded first, so a rejected
    /// request also leaves the slot empty.
    pub fn submit(&self, mut task: Box<dyn Task>) -> Result<(), PluginError> {
        {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Executing => return Err(PluginError::TaskRunning),
                Slot::Pending(_) => debug!("discarding unconfirmed task"),
                Slot::Empty => {}
            }
            *slot = Slot::Empty;
        }

        task.plan()?;
        info!(action = task.action().verb(), "task awaiting confirmation");

        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Executing) {
            return Err(PluginError::TaskRunning);
        }
        *slot = Slot::Pending(task);
        Ok(())
    }

    /// Drop the pending task without running it. An executing task is left
    /// alone.
    pub fn clear(&self) {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Pending(_)) {
            *slot = Slot::Empty;
        }
    }

    pub fn has_pending(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Pending(_))
    }

    pub fn is_executing(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Executing)
    }

    pub fn pending_action(&self) -> Option<Action> {
        match &*self.slot.lock() {
            Slot::Pending(task) => Some(task.action()),
            _ => None,
        }
    }

    /// Execute the pending task off the caller's thread.
    ///
    /// Must be called from within a tokio runtime.
    pub fn confirm(&self, reply: &dyn ReplySink) -> Confirmation {
        let mut task = {
            let mut slot = self.slot.lock();
            match std::mem::take(&mut *slot) {
                Slot::Pending(task) => {
                    *slot = Slot::Executing;
                    task
                }
                Slot::Executing => {
                    *slot = Slot::Executing;
                    reply.emit(&PluginError::TaskRunning.to_string());
                    return Confirmation::Busy;
                }
                Slot::Empty => {
                    reply.emit("Nothing to confirm");
                    return Confirmation::NothingToConfirm;
                }
            }
        };

        let guard = ExecutionGuard(Arc::clone(&self.slot));
        let handle = tokio::spawn(async move {
            let _guard = guard;
            info!(action = task.action().verb(), "executing confirmed task");
            let state = task.execute().await;
            debug!(state = ?task.state(), "task slot released");
            state
        });
        Confirmation::Started(handle)
    }
}
