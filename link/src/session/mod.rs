//! Session-side bookkeeping for pending mutations.
//!
//! A [`DeferredCommands`] ledger collects typed [`CommandData`] records
//! keyed by [`IdTypeAndName`], rejects conflicting registrations, and hands
//! out flush snapshots ([`SaveChangesData`]) that are only cleared once the
//! caller confirms the batch succeeded.

pub mod command_data;
pub mod deferred_commands;
pub mod save_changes_data;

pub use command_data::{CommandData, CommandType, IdTypeAndName, PatchRequest};
pub use deferred_commands::DeferredCommands;
pub use save_changes_data::{ActionsToRunOnSuccess, FailedSaveChanges, SaveChangesData};
