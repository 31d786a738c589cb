//! Event handler capability.

use crate::error::Result;
use crate::events::types::ClusterMessage;
use crate::switch::Switch;
use async_trait::async_trait;

/// Trait for event handlers
///
/// Handlers are bound into the [`HandlerRegistry`](crate::events::HandlerRegistry)
/// under the type tag they report and are invoked from dispatch workers, so
/// several invocations may run concurrently.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Type tag of the messages this handler consumes
    fn handled_type(&self) -> &str;

    /// Handler name, used for enable toggles and management listings
    fn name(&self) -> &str;

    /// Handler switch; a switched-off handler is treated as not bound
    fn switch(&self) -> &Switch;

    /// Handle a message
    async fn handle(&self, message: ClusterMessage) -> Result<()>;
}
