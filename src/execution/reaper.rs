//! One-shot expiry of pending commands.

use crate::execution::command::PendingCommand;
use crate::execution::store::PendingCommandStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Schedules the eviction of a command once its timeout elapses
///
/// On fire the command is removed from the store (if still present) and
/// force-completed with whatever results accumulated, so the waiting caller
/// always unblocks. A command that already completed and was removed makes
/// the reaper a no-op.
#[derive(Debug, Clone)]
pub struct ExpiryReaper {
    store: Arc<PendingCommandStore>,
}

impl ExpiryReaper {
    pub fn new(store: Arc<PendingCommandStore>) -> Self {
        Self { store }
    }

    /// Arm a reaper for `command`, firing after `after`
    pub fn schedule(&self, command: Arc<PendingCommand>, after: Duration) -> JoinHandle<bool> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            Self::expire(&store, &command)
        })
    }

    /// Evict and force-complete; returns whether anything was evicted
    pub fn expire(store: &PendingCommandStore, command: &Arc<PendingCommand>) -> bool {
        if !store.remove_entry(command) {
            return false;
        }

        let received = command.received();
        command.on_timeout();
        debug!(
            command_id = %command.id(),
            command_type = %command.command().command_type(),
            received,
            "Command expired"
        );
        true
    }
}
