//! Concurrent registry of in-flight commands.

use crate::execution::command::PendingCommand;
use dashmap::DashMap;
use std::sync::Arc;

/// In-flight commands keyed by command id
///
/// Per-key operations are atomic, so the reaper and result correlation can
/// race on the same id without either observing a partial entry.
#[derive(Debug, Default)]
pub struct PendingCommandStore {
    commands: DashMap<String, Arc<PendingCommand>>,
}

impl PendingCommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command, returning any entry it displaced
    pub fn put(&self, id: impl Into<String>, command: Arc<PendingCommand>) -> Option<Arc<PendingCommand>> {
        self.commands.insert(id.into(), command)
    }

    pub fn get(&self, id: &str) -> Option<Arc<PendingCommand>> {
        self.commands.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<PendingCommand>> {
        self.commands.remove(id).map(|(_, command)| command)
    }

    /// Remove `id` only while it still maps to this exact entry
    pub fn remove_entry(&self, command: &Arc<PendingCommand>) -> bool {
        self.commands
            .remove_if(command.id(), |_, current| Arc::ptr_eq(current, command))
            .is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.commands.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.commands.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
