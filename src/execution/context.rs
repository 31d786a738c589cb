//! # Execution Context
//!
//! Submits commands to the cluster and waits, bounded by the command's
//! timeout, for the correlated results.
//!
//! ```text
//! execute ─► store.put ─► reaper.schedule ─► producer.produce ─► wait(timeout)
//!                                                                   ▲
//!            ResultHandler ─► store.get ─► add_results ─────────────┘
//! ```
//!
//! The caller always gets back the map that accumulated: full when every
//! destination answered, partial or empty when the wait elapsed. Errors are
//! only raised for wiring problems, before anything is published.

use crate::config::CommandConfig;
use crate::error::{MeshError, Result};
use crate::events::producer::EventProducer;
use crate::execution::command::{Command, CommandResults, PendingCommand};
use crate::execution::reaper::ExpiryReaper;
use crate::execution::store::PendingCommandStore;
use crate::logging::log_command_operation;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// What came back for a command
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub command_id: String,
    /// Number of destination nodes; `None` for broadcasts
    pub expected: Option<usize>,
    pub results: CommandResults,
}

impl CommandOutcome {
    /// Every destination node answered
    pub fn is_complete(&self) -> bool {
        self.expected.is_some_and(|expected| self.results.len() >= expected)
    }

    /// Convert an incomplete outcome into [`MeshError::CommandTimeout`]
    pub fn require_complete(self) -> Result<CommandResults> {
        match self.expected {
            Some(expected) if self.results.len() < expected => Err(MeshError::CommandTimeout {
                command_id: self.command_id,
                received: self.results.len(),
                expected,
            }),
            _ => Ok(self.results),
        }
    }

    pub fn into_results(self) -> CommandResults {
        self.results
    }
}

/// Submits commands and aggregates their results
pub struct ExecutionContext {
    store: RwLock<Option<Arc<PendingCommandStore>>>,
    producer: RwLock<Option<Arc<EventProducer>>>,
    config: CommandConfig,
}

impl ExecutionContext {
    /// Create an unbound context; a store and a producer must be bound
    /// before commands can be executed
    pub fn new(config: CommandConfig) -> Self {
        Self {
            store: RwLock::new(None),
            producer: RwLock::new(None),
            config,
        }
    }

    /// Create a context with store and producer already bound
    pub fn bound(
        config: CommandConfig,
        store: Arc<PendingCommandStore>,
        producer: Arc<EventProducer>,
    ) -> Self {
        let context = Self::new(config);
        context.bind_store(store);
        context.bind_producer(producer);
        context
    }

    pub fn bind_store(&self, store: Arc<PendingCommandStore>) {
        *self.store.write() = Some(store);
    }

    pub fn unbind_store(&self) {
        *self.store.write() = None;
    }

    pub fn bind_producer(&self, producer: Arc<EventProducer>) {
        *self.producer.write() = Some(producer);
    }

    pub fn unbind_producer(&self) {
        *self.producer.write() = None;
    }

    pub fn store(&self) -> Option<Arc<PendingCommandStore>> {
        self.store.read().clone()
    }

    /// Execute a command and return the results keyed by responding node
    pub async fn execute(&self, command: Command) -> Result<CommandResults> {
        self.execute_outcome(command).await.map(CommandOutcome::into_results)
    }

    /// Execute a command, keeping the expected count alongside the results
    pub async fn execute_outcome(&self, mut command: Command) -> Result<CommandOutcome> {
        let store = self.store().ok_or(MeshError::StoreUnavailable)?;
        let producer = self
            .producer
            .read()
            .clone()
            .ok_or(MeshError::TransportUnavailable)?;

        if self.config.validate_ids {
            validate(&command)?;
        }

        if command.event.source_node.is_none() {
            command.event.source_node = Some(producer.local_node().clone());
        }
        let timeout = command
            .timeout()
            .unwrap_or_else(|| Duration::from_millis(self.config.default_timeout_ms));
        let command_id = command.id().to_string();
        let command_type = command.command_type().to_string();
        let expected = command.destination().map(|d| d.len());

        let (pending, receiver) = PendingCommand::new(command.clone());
        let pending = Arc::new(pending);
        if let Some(displaced) = store.put(command_id.clone(), pending.clone()) {
            warn!(command_id = %command_id, "Command id reused, previous command expired");
            displaced.on_timeout();
        }
        let reaper = ExpiryReaper::new(store.clone()).schedule(pending.clone(), timeout);

        if let Err(e) = producer.produce(command.into()).await {
            store.remove_entry(&pending);
            reaper.abort();
            log_command_operation(
                "execute",
                &command_id,
                &command_type,
                "publish_failed",
                Some(&e.to_string()),
            );
            return Err(e);
        }
        log_command_operation("execute", &command_id, &command_type, "published", None);

        let results = match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(results)) => results,
            // Sender dropped or wait elapsed first: take what arrived
            Ok(Err(_)) | Err(_) => {
                pending.on_timeout();
                pending.snapshot()
            }
        };

        store.remove_entry(&pending);
        reaper.abort();

        let outcome = CommandOutcome {
            command_id,
            expected,
            results,
        };
        let status = if outcome.is_complete() { "completed" } else { "timed_out" };
        let details = format!(
            "{}/{} results",
            outcome.results.len(),
            expected.map_or_else(|| "*".to_string(), |e| e.to_string())
        );
        log_command_operation("execute", &outcome.command_id, &command_type, status, Some(&details));

        Ok(outcome)
    }
}

fn validate(command: &Command) -> Result<()> {
    if command.id().trim().is_empty() {
        return Err(MeshError::InvalidCommand {
            reason: "command id is empty".to_string(),
        });
    }
    if command.command_type().trim().is_empty() {
        return Err(MeshError::InvalidCommand {
            reason: "command type is empty".to_string(),
        });
    }
    if command.timeout_ms == Some(0) {
        return Err(MeshError::InvalidCommand {
            reason: "command timeout must be greater than zero".to_string(),
        });
    }
    if command.destination().is_some_and(|d| d.is_empty()) {
        return Err(MeshError::InvalidCommand {
            reason: "destination set is empty".to_string(),
        });
    }
    Ok(())
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("store_bound", &self.store.read().is_some())
            .field("producer_bound", &self.producer.read().is_some())
            .field("config", &self.config)
            .finish()
    }
}
