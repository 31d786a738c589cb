//! Command and result handlers.
//!
//! A [`CommandHandler`] computes the local answer to a command. Wrapped in a
//! [`CommandHandlerAdapter`] it is bound into the handler registry like any
//! other event handler, and the answer is produced back to the command's
//! originator. There a [`ResultHandler`] correlates it against the pending
//! command by id.

use crate::error::{MeshError, Result};
use crate::events::handler::EventHandler;
use crate::events::producer::EventProducer;
use crate::events::types::ClusterMessage;
use crate::execution::command::{Command, CommandResult};
use crate::execution::store::PendingCommandStore;
use crate::switch::Switch;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

/// Computes the local result of a command
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Type tag of the commands this handler executes
    fn command_type(&self) -> &str;

    /// Type tag of the results it produces
    fn result_type(&self) -> &str;

    fn name(&self) -> &str;

    fn switch(&self) -> &Switch;

    async fn execute(&self, command: &Command) -> Result<CommandResult>;
}

/// Exposes a [`CommandHandler`] as an [`EventHandler`] that publishes the
/// computed result
pub struct CommandHandlerAdapter {
    inner: Arc<dyn CommandHandler>,
    producer: Arc<EventProducer>,
}

impl CommandHandlerAdapter {
    pub fn new(inner: Arc<dyn CommandHandler>, producer: Arc<EventProducer>) -> Self {
        Self { inner, producer }
    }

    pub fn inner(&self) -> &Arc<dyn CommandHandler> {
        &self.inner
    }
}

#[async_trait]
impl EventHandler for CommandHandlerAdapter {
    fn handled_type(&self) -> &str {
        self.inner.command_type()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn switch(&self) -> &Switch {
        self.inner.switch()
    }

    async fn handle(&self, message: ClusterMessage) -> Result<()> {
        let command = match message {
            ClusterMessage::Command(command) => command,
            other => {
                return Err(MeshError::Handler {
                    handler: self.name().to_string(),
                    reason: format!("expected a command, got '{}'", other.event_type()),
                })
            }
        };

        let result = self.inner.execute(&command).await?;
        debug!(
            command_id = %command.id(),
            command_type = %command.command_type(),
            result_type = %result.result_type(),
            "Command executed, sending result"
        );
        self.producer.produce(result.into()).await?;
        Ok(())
    }
}

/// Correlates incoming results with pending commands
pub struct ResultHandler {
    result_type: String,
    name: String,
    store: Arc<PendingCommandStore>,
    switch: Switch,
}

impl ResultHandler {
    pub fn new(result_type: impl Into<String>, store: Arc<PendingCommandStore>) -> Self {
        let result_type = result_type.into();
        let name = format!("{result_type}-handler");
        Self {
            switch: Switch::new(name.clone()),
            result_type,
            name,
            store,
        }
    }

    /// Correlate one result; returns whether it completed its command
    pub fn correlate(&self, result: CommandResult) -> bool {
        let Some(pending) = self.store.get(result.id()) else {
            trace!(command_id = %result.id(), "No pending command for result, ignored");
            return false;
        };

        let completed = pending.add_results([result]);
        if completed {
            self.store.remove_entry(&pending);
            debug!(command_id = %pending.id(), "Command completed");
        }
        completed
    }
}

#[async_trait]
impl EventHandler for ResultHandler {
    fn handled_type(&self) -> &str {
        &self.result_type
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn switch(&self) -> &Switch {
        &self.switch
    }

    async fn handle(&self, message: ClusterMessage) -> Result<()> {
        match message {
            ClusterMessage::Result(result) => {
                self.correlate(result);
                Ok(())
            }
            other => Err(MeshError::Handler {
                handler: self.name.clone(),
                reason: format!("expected a result, got '{}'", other.event_type()),
            }),
        }
    }
}
