//! # Transport
//!
//! Pluggable pub/sub transport contract plus [`LocalBus`], an in-process
//! broadcast bus used when every node lives in the same process (tests,
//! embedding, single-node deployments).

use crate::error::Result;
use crate::events::types::ClusterMessage;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

/// Outbound half of a pub/sub transport
///
/// Delivery is at-least-once with no ordering guarantee across different
/// commands. Inbound messages are handed to an
/// [`EventConsumer`](crate::events::EventConsumer).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, message: ClusterMessage) -> Result<()>;
}

/// In-process broadcast bus
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<ClusterMessage>,
}

impl LocalBus {
    /// Create a new bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every message published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterMessage> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(crate::constants::defaults::CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl Transport for LocalBus {
    async fn publish(&self, message: ClusterMessage) -> Result<()> {
        trace!(event_type = message.event_type(), id = message.id(), "Publishing on local bus");
        // No subscribers is not an error for fire-and-forget delivery
        let _ = self.sender.send(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::Event;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = LocalBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(Event::with_id("e-1", "ping").into()).await.unwrap();

        assert_eq!(first.recv().await.unwrap().id(), "e-1");
        assert_eq!(second.recv().await.unwrap().id(), "e-1");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = LocalBus::new(16);
        assert!(bus.publish(Event::new("ping").into()).await.is_ok());
    }
}
