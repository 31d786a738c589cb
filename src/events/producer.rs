//! Switchable outbound producer.

use crate::cluster::Node;
use crate::error::Result;
use crate::events::transport::Transport;
use crate::events::types::ClusterMessage;
use crate::switch::Switch;
use std::sync::Arc;
use tracing::debug;

/// Publishes messages through a transport, honouring the producer switch
pub struct EventProducer {
    transport: Arc<dyn Transport>,
    local_node: Node,
    switch: Switch,
}

impl EventProducer {
    pub fn new(transport: Arc<dyn Transport>, local_node: Node) -> Self {
        Self {
            transport,
            local_node,
            switch: Switch::new("producer"),
        }
    }

    /// Publish a message. Non-forced messages are dropped while the producer
    /// switch is off; returns whether the message was handed to the transport.
    pub async fn produce(&self, mut message: ClusterMessage) -> Result<bool> {
        if !self.switch.is_on() && !message.is_forced() {
            debug!(
                event_type = message.event_type(),
                id = message.id(),
                "Producer switched off, event not sent"
            );
            return Ok(false);
        }

        let header = message.header_mut();
        if header.source_node.is_none() {
            header.source_node = Some(self.local_node.clone());
        }

        self.transport.publish(message).await?;
        Ok(true)
    }

    pub fn switch(&self) -> &Switch {
        &self.switch
    }

    pub fn local_node(&self) -> &Node {
        &self.local_node
    }
}

impl std::fmt::Debug for EventProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProducer")
            .field("local_node", &self.local_node)
            .field("switch", &self.switch.status())
            .finish()
    }
}
