//! Switchable inbound consumer feeding the dispatcher.

use crate::cluster::Node;
use crate::events::dispatcher::EventDispatcher;
use crate::events::types::ClusterMessage;
use crate::switch::Switch;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Receives messages from the transport and hands them to the dispatcher
pub struct EventConsumer {
    dispatcher: Arc<EventDispatcher>,
    local_node: Node,
    switch: Switch,
    receive_loop: Mutex<Option<JoinHandle<()>>>,
}

impl EventConsumer {
    pub fn new(dispatcher: Arc<EventDispatcher>, local_node: Node) -> Self {
        Self {
            dispatcher,
            local_node,
            switch: Switch::new("consumer"),
            receive_loop: Mutex::new(None),
        }
    }

    /// Inbound callback: filters by destination and switch, then dispatches.
    /// Returns whether the message was dispatched.
    pub fn consume(&self, message: ClusterMessage) -> bool {
        if !message.header().is_addressed_to(&self.local_node) {
            trace!(id = message.id(), node = %self.local_node.id, "Message not addressed to this node");
            return false;
        }
        if !self.switch.is_on() && !message.is_forced() {
            debug!(
                event_type = message.event_type(),
                id = message.id(),
                "Consumer switched off, event ignored"
            );
            return false;
        }
        self.dispatcher.dispatch(message);
        true
    }

    /// Start consuming from a bus subscription
    pub fn start(self: &Arc<Self>, mut receiver: broadcast::Receiver<ClusterMessage>) {
        let mut slot = self.receive_loop.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!(node = %self.local_node.id, "Consumer already started");
            return;
        }

        let consumer = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        consumer.consume(message);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, node = %consumer.local_node.id, "Consumer lagged, messages skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(node = %consumer.local_node.id, "Transport closed, consumer stopping");
                        break;
                    }
                }
            }
        }));
        info!(node = %self.local_node.id, "Consumer started");
    }

    /// Stop the receive loop
    pub fn stop(&self) {
        if let Some(handle) = self.receive_loop.lock().take() {
            handle.abort();
            info!(node = %self.local_node.id, "Consumer stopped");
        }
    }

    pub fn is_consuming(&self) -> bool {
        self.receive_loop
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn switch(&self) -> &Switch {
        &self.switch
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }
}

impl Drop for EventConsumer {
    fn drop(&mut self) {
        if let Some(handle) = self.receive_loop.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::events::registry::HandlerRegistry;
    use crate::events::transport::{LocalBus, Transport};
    use crate::events::types::Event;
    use crate::execution::command::Command;

    fn consumer_for(node: &Node) -> Arc<EventConsumer> {
        let registry = Arc::new(HandlerRegistry::new());
        let config = DispatchConfig {
            interval_ms: 10,
            timeout_ms: 20,
            ..Default::default()
        };
        let dispatcher = Arc::new(EventDispatcher::new(registry, &config).unwrap());
        Arc::new(EventConsumer::new(dispatcher, node.clone()))
    }

    #[tokio::test]
    async fn test_consume_filters_destination() {
        let n1 = Node::new("n1", "127.0.0.1", 5701);
        let n2 = Node::new("n2", "127.0.0.1", 5702);
        let consumer = consumer_for(&n1);

        assert!(consumer.consume(Event::new("x").into()));
        assert!(consumer.consume(Event::new("x").with_destination([n1.clone()]).into()));
        assert!(!consumer.consume(Event::new("x").with_destination([n2]).into()));
    }

    #[tokio::test]
    async fn test_switched_off_consumer_accepts_forced_only() {
        let n1 = Node::new("n1", "127.0.0.1", 5701);
        let consumer = consumer_for(&n1);
        consumer.switch().turn_off();

        assert!(!consumer.consume(Event::new("x").into()));
        assert!(consumer.consume(Event::new("x").with_force(true).into()));
        assert!(consumer.consume(Command::new("status").into()));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let n1 = Node::new("n1", "127.0.0.1", 5701);
        let consumer = consumer_for(&n1);
        let bus = LocalBus::new(8);

        consumer.start(bus.subscribe());
        assert!(consumer.is_consuming());

        bus.publish(Event::new("x").into()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(consumer.dispatcher().stats().in_flight + consumer.dispatcher().stats().dropped >= 1);

        consumer.stop();
        assert!(!consumer.is_consuming());
    }
}
