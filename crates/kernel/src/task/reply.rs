//! One-way, user-facing text output for tasks.

use std::sync::Arc;

use parking_lot::Mutex;

/// Receives the messages a task reports to the user.
pub trait ReplySink: Send + Sync {
    fn emit(&self, message: &str);
}

/// Prints every message on its own line to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReply;

impl ReplySink for ConsoleReply {
    fn emit(&self, message: &str) {
        println!("{message}");
    }
}

/// Keeps every message in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct CollectingReply {
    messages: Arc<Mutex<Vec<String>>>,
}

impl CollectingReply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the messages emitted so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Whether any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().iter().any(|m| m.contains(needle))
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl ReplySink for CollectingReply {
    fn emit(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}
