use log::debug;
use std::collections::{HashMap, HashSet};

use crate::error::{RavenLinkError, Result};

use super::command_data::{CommandData, CommandType, IdTypeAndName};
use super::save_changes_data::{FailedSaveChanges, SaveChangesData};

struct Entry {
    seq: u64,
    key: IdTypeAndName,
    command: CommandData,
}

/// Ordered ledger of pending commands.
///
/// At most one command is held per [`IdTypeAndName`]. Entries leave the
/// ledger only through [`confirm_success`](Self::confirm_success) or
/// [`clear`](Self::clear).
///
/// # Example
///
/// ```rust
/// use raven_link::{CommandData, DeferredCommands};
/// use serde_json::json;
///
/// let mut ledger = DeferredCommands::new();
/// ledger.defer(CommandData::put("users/1", json!({ "Name": "Oren" }), None)?)?;
/// ledger.defer(CommandData::attachment_put("users/1", "photo.png", None, None)?)?;
///
/// // Deleting the document would orphan the pending attachment
/// assert!(ledger.defer(CommandData::delete("users/1", None)?).is_err());
///
/// let flush = ledger.flush();
/// assert_eq!(flush.len(), 2);
/// ledger.confirm_success(flush);
/// assert!(!ledger.has_changes());
/// # Ok::<(), raven_link::RavenLinkError>(())
/// ```
#[derive(Default)]
pub struct DeferredCommands {
    entries: Vec<Entry>,
    keys: HashMap<IdTypeAndName, u64>,
    next_seq: u64,
}

impl std::fmt::Debug for DeferredCommands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.key))
            .finish()
    }
}

impl DeferredCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command.
    ///
    /// Returns `Ok(false)` when the command is redundant (deleting an
    /// attachment whose document or attachment delete is already pending)
    /// and `DeferredCommandConflict` when it clashes with a pending one.
    pub fn defer(&mut self, command: CommandData) -> Result<bool> {
        if !self.check(&command)? {
            debug!("[raven-link] Skipping redundant deferred {}", command.key());
            return Ok(false);
        }
        let key = command.key();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.keys.insert(key.clone(), seq);
        self.entries.push(Entry { seq, key, command });
        Ok(true)
    }

    /// Register several commands, all or nothing.
    pub fn defer_all(&mut self, commands: impl IntoIterator<Item = CommandData>) -> Result<()> {
        let mark = self.entries.len();
        for command in commands {
            if let Err(e) = self.defer(command) {
                for entry in self.entries.drain(mark..) {
                    self.keys.remove(&entry.key);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn has(&self, id: &str, command_type: CommandType, name: Option<&str>) -> bool {
        self.keys
            .contains_key(&IdTypeAndName::create(id, command_type, name))
    }

    fn conflict(message: String) -> RavenLinkError {
        RavenLinkError::DeferredCommandConflict(message)
    }

    /// `Ok(true)` to insert, `Ok(false)` to skip.
    fn check(&self, command: &CommandData) -> Result<bool> {
        match command {
            CommandData::AttachmentPut { id, name, .. } => {
                if self.has(id, CommandType::Delete, None) {
                    return Err(Self::conflict(format!(
                        "Cannot store attachment '{}' of document '{}': the document is pending deletion",
                        name, id
                    )));
                }
                if self.has(id, CommandType::AttachmentPut, Some(name)) {
                    return Err(Self::conflict(format!(
                        "Cannot store attachment '{}' of document '{}': an attachment with the same name is already pending",
                        name, id
                    )));
                }
                if self.has(id, CommandType::AttachmentDelete, Some(name)) {
                    return Err(Self::conflict(format!(
                        "Cannot store attachment '{}' of document '{}': the attachment is pending deletion",
                        name, id
                    )));
                }
            },
            CommandData::AttachmentDelete { id, name, .. } => {
                if self.has(id, CommandType::Delete, None)
                    || self.has(id, CommandType::AttachmentDelete, Some(name))
                {
                    return Ok(false);
                }
                if self.has(id, CommandType::AttachmentPut, Some(name)) {
                    return Err(Self::conflict(format!(
                        "Cannot delete attachment '{}' of document '{}': the attachment is pending creation",
                        name, id
                    )));
                }
            },
            CommandData::Delete { id, .. } => {
                let lowered = id.to_lowercase();
                if self
                    .keys
                    .keys()
                    .any(|k| k.id == lowered && k.command_type == CommandType::AttachmentPut)
                {
                    return Err(Self::conflict(format!(
                        "Cannot delete document '{}': an attachment of it is pending creation",
                        id
                    )));
                }
            },
            _ => {},
        }

        let key = command.key();
        if self.keys.contains_key(&key) {
            return Err(Self::conflict(format!("A command for {} is already pending", key)));
        }
        Ok(true)
    }

    pub fn contains(&self, key: &IdTypeAndName) -> bool {
        self.keys.contains_key(key)
    }

    pub fn get(&self, key: &IdTypeAndName) -> Option<&CommandData> {
        let seq = self.keys.get(key)?;
        self.entries
            .iter()
            .find(|e| e.seq == *seq)
            .map(|e| &e.command)
    }

    /// Pending commands in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandData> {
        self.entries.iter().map(|e| &e.command)
    }

    pub fn number_of_commands(&self) -> usize {
        self.entries.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Snapshot of every pending command. The ledger is unchanged until the
    /// snapshot is confirmed.
    pub fn flush(&self) -> SaveChangesData {
        SaveChangesData::new(
            self.entries
                .iter()
                .map(|e| (e.seq, e.command.clone()))
                .collect(),
        )
    }

    /// Drop exactly the flushed entries and run the success actions.
    ///
    /// Returns the number of entries removed.
    pub fn confirm_success(&mut self, data: SaveChangesData) -> usize {
        let (flushed, actions) = data.into_parts();
        let seqs: HashSet<u64> = flushed.iter().map(|(seq, _)| *seq).collect();
        let before = self.entries.len();
        self.entries.retain(|e| !seqs.contains(&e.seq));
        self.keys.retain(|_, seq| !seqs.contains(seq));
        actions.run();
        before - self.entries.len()
    }

    /// Give up on a flush; the ledger keeps every entry.
    pub fn abort(&self, data: SaveChangesData) -> FailedSaveChanges {
        let (flushed, _) = data.into_parts();
        FailedSaveChanges {
            commands: flushed.into_iter().map(|(_, cmd)| cmd).collect(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }
}
