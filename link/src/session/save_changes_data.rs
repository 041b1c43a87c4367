use serde_json::Value as JsonValue;
use std::fmt;

use super::command_data::CommandData;

/// Cleanup callbacks that run once a flush is confirmed.
#[derive(Default)]
pub struct ActionsToRunOnSuccess {
    actions: Vec<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for ActionsToRunOnSuccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionsToRunOnSuccess")
            .field("actions", &self.actions.len())
            .finish()
    }
}

impl ActionsToRunOnSuccess {
    pub fn push(&mut self, action: impl FnOnce() + Send + 'static) {
        self.actions.push(Box::new(action));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub(crate) fn run(self) {
        for action in self.actions {
            action();
        }
    }
}

/// Snapshot of the ledger taken by [`DeferredCommands::flush`](super::DeferredCommands::flush).
#[derive(Debug)]
pub struct SaveChangesData {
    pub(crate) entries: Vec<(u64, CommandData)>,
    on_success: ActionsToRunOnSuccess,
}

impl SaveChangesData {
    pub(crate) fn new(entries: Vec<(u64, CommandData)>) -> Self {
        Self {
            entries,
            on_success: ActionsToRunOnSuccess::default(),
        }
    }

    /// Commands in flush order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandData> {
        self.entries.iter().map(|(_, cmd)| cmd)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Batch wire representation of every command.
    pub fn serialize_commands(&self) -> Vec<JsonValue> {
        self.commands().map(CommandData::serialize).collect()
    }

    pub fn on_success(&mut self) -> &mut ActionsToRunOnSuccess {
        &mut self.on_success
    }

    pub(crate) fn into_parts(self) -> (Vec<(u64, CommandData)>, ActionsToRunOnSuccess) {
        (self.entries, self.on_success)
    }
}

/// Commands of a flush the caller reported as failed.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedSaveChanges {
    pub commands: Vec<CommandData>,
}
