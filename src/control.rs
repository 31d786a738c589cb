//! # Control Commands
//!
//! Built-in commands that manage a node remotely: flipping its producer or
//! consumer switch and listing or toggling its event handlers.
//!
//! | command           | properties               | result properties   |
//! |-------------------|--------------------------|---------------------|
//! | `producer-switch` | `status`: on/off/absent  | `success`, `status` |
//! | `consumer-switch` | `status`: on/off/absent  | `success`, `status` |
//! | `manage-handlers` | `handler`, `status`      | `success`, `handlers` |

use crate::cluster::Node;
use crate::constants::control::{
    CONSUMER_SWITCH_COMMAND, CONSUMER_SWITCH_RESULT, MANAGE_HANDLERS_COMMAND,
    MANAGE_HANDLERS_RESULT, PRODUCER_SWITCH_COMMAND, PRODUCER_SWITCH_RESULT,
};
use crate::error::Result;
use crate::events::consumer::EventConsumer;
use crate::events::producer::EventProducer;
use crate::events::registry::HandlerRegistry;
use crate::execution::command::{Command, CommandResult};
use crate::execution::handler::{CommandHandler, CommandHandlerAdapter, ResultHandler};
use crate::execution::store::PendingCommandStore;
use crate::properties::PropertySource;
use crate::switch::{Switch, SwitchStatus};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, Weak};
use tracing::{info, warn};

pub const STATUS_PROPERTY: &str = "status";
pub const HANDLER_PROPERTY: &str = "handler";
pub const HANDLERS_PROPERTY: &str = "handlers";
pub const SUCCESS_PROPERTY: &str = "success";

/// Parse the requested status: `Ok(None)` for a query
fn requested_status(command: &Command) -> std::result::Result<Option<SwitchStatus>, String> {
    match command.event.property(STATUS_PROPERTY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(on)) => Ok(Some(SwitchStatus::from(*on))),
        Some(Value::String(text)) => SwitchStatus::parse(text)
            .map(Some)
            .ok_or_else(|| format!("unknown status '{text}'")),
        Some(other) => Err(format!("unknown status '{other}'")),
    }
}

enum SwitchTarget {
    Producer(Arc<EventProducer>),
    Consumer(Arc<EventConsumer>),
}

impl SwitchTarget {
    fn switch(&self) -> &Switch {
        match self {
            SwitchTarget::Producer(producer) => producer.switch(),
            SwitchTarget::Consumer(consumer) => consumer.switch(),
        }
    }
}

/// Queries or flips the local producer or consumer switch
pub struct SwitchCommandHandler {
    target: SwitchTarget,
    command_type: &'static str,
    result_type: &'static str,
    name: &'static str,
    local_node: Node,
    switch: Switch,
}

impl SwitchCommandHandler {
    pub fn producer(producer: Arc<EventProducer>, local_node: Node) -> Self {
        Self {
            target: SwitchTarget::Producer(producer),
            command_type: PRODUCER_SWITCH_COMMAND,
            result_type: PRODUCER_SWITCH_RESULT,
            name: "producer-switch-handler",
            local_node,
            switch: Switch::new("producer-switch-handler"),
        }
    }

    pub fn consumer(consumer: Arc<EventConsumer>, local_node: Node) -> Self {
        Self {
            target: SwitchTarget::Consumer(consumer),
            command_type: CONSUMER_SWITCH_COMMAND,
            result_type: CONSUMER_SWITCH_RESULT,
            name: "consumer-switch-handler",
            local_node,
            switch: Switch::new("consumer-switch-handler"),
        }
    }
}

#[async_trait]
impl CommandHandler for SwitchCommandHandler {
    fn command_type(&self) -> &str {
        self.command_type
    }

    fn result_type(&self) -> &str {
        self.result_type
    }

    fn name(&self) -> &str {
        self.name
    }

    fn switch(&self) -> &Switch {
        &self.switch
    }

    async fn execute(&self, command: &Command) -> Result<CommandResult> {
        let target = self.target.switch();
        let success = match requested_status(command) {
            Ok(Some(status)) => {
                target.set(status);
                info!(switch = target.name(), status = %status, "Switch changed by control command");
                true
            }
            Ok(None) => true,
            Err(reason) => {
                warn!(command_id = %command.id(), reason = %reason, "Invalid switch command");
                false
            }
        };

        Ok(CommandResult::reply_to(command, self.result_type, self.local_node.clone())
            .with_property(SUCCESS_PROPERTY, success)
            .with_property(STATUS_PROPERTY, target.status().to_string()))
    }
}

/// Lists the bound handlers, or toggles one and persists the toggle
pub struct ManageHandlersCommandHandler {
    registry: Weak<HandlerRegistry>,
    properties: Arc<dyn PropertySource>,
    local_node: Node,
    switch: Switch,
}

impl ManageHandlersCommandHandler {
    /// The registry is held weakly since this handler is bound into it
    pub fn new(registry: &Arc<HandlerRegistry>, properties: Arc<dyn PropertySource>, local_node: Node) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            properties,
            local_node,
            switch: Switch::new("manage-handlers-handler"),
        }
    }

    fn toggle(&self, registry: &HandlerRegistry, name: &str, status: SwitchStatus) -> bool {
        let Some(handler) = registry.find_by_name(name) else {
            warn!(handler = %name, "No bound handler with that name");
            return false;
        };
        handler.switch().set(status);
        self.properties.set_handler_enabled(name, status.as_bool());
        info!(handler = %name, status = %status, "Handler toggled by control command");
        true
    }
}

#[async_trait]
impl CommandHandler for ManageHandlersCommandHandler {
    fn command_type(&self) -> &str {
        MANAGE_HANDLERS_COMMAND
    }

    fn result_type(&self) -> &str {
        MANAGE_HANDLERS_RESULT
    }

    fn name(&self) -> &str {
        "manage-handlers-handler"
    }

    fn switch(&self) -> &Switch {
        &self.switch
    }

    async fn execute(&self, command: &Command) -> Result<CommandResult> {
        let mut handlers = Map::new();
        let success = match self.registry.upgrade() {
            Some(registry) => {
                let target = command.event.property_str(HANDLER_PROPERTY);
                let success = match (target, requested_status(command)) {
                    (Some(name), Ok(Some(status))) => self.toggle(&registry, name, status),
                    (_, Ok(_)) => true,
                    (_, Err(reason)) => {
                        warn!(command_id = %command.id(), reason = %reason, "Invalid manage-handlers command");
                        false
                    }
                };
                for (name, status) in registry.statuses() {
                    handlers.insert(name, Value::String(status.to_string()));
                }
                success
            }
            None => false,
        };

        Ok(CommandResult::reply_to(command, MANAGE_HANDLERS_RESULT, self.local_node.clone())
            .with_property(SUCCESS_PROPERTY, success)
            .with_property(HANDLERS_PROPERTY, Value::Object(handlers)))
    }
}

/// Bind the control command handlers and their result handlers
pub fn install_control_handlers(
    registry: &Arc<HandlerRegistry>,
    producer: &Arc<EventProducer>,
    consumer: &Arc<EventConsumer>,
    properties: Arc<dyn PropertySource>,
    store: &Arc<PendingCommandStore>,
) {
    let local = producer.local_node().clone();
    let command_handlers: [Arc<dyn CommandHandler>; 3] = [
        Arc::new(SwitchCommandHandler::producer(producer.clone(), local.clone())),
        Arc::new(SwitchCommandHandler::consumer(consumer.clone(), local.clone())),
        Arc::new(ManageHandlersCommandHandler::new(registry, properties, local)),
    ];

    for handler in command_handlers {
        let result_type = handler.result_type().to_string();
        registry.bind(Arc::new(CommandHandlerAdapter::new(handler, producer.clone())));
        registry.bind(Arc::new(ResultHandler::new(result_type, store.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::events::dispatcher::EventDispatcher;
    use crate::events::transport::LocalBus;
    use crate::properties::InMemoryProperties;

    fn local() -> Node {
        Node::new("n1", "127.0.0.1", 5701)
    }

    #[tokio::test]
    async fn test_producer_switch_query_and_toggle() {
        let producer = Arc::new(EventProducer::new(Arc::new(LocalBus::new(8)), local()));
        let handler = SwitchCommandHandler::producer(producer.clone(), local());

        let result = handler.execute(&Command::new(PRODUCER_SWITCH_COMMAND)).await.unwrap();
        assert_eq!(result.property(STATUS_PROPERTY), Some(&Value::from("ON")));

        let command = Command::new(PRODUCER_SWITCH_COMMAND).with_property(STATUS_PROPERTY, "off");
        let result = handler.execute(&command).await.unwrap();
        assert_eq!(result.result_type(), PRODUCER_SWITCH_RESULT);
        assert_eq!(result.property(SUCCESS_PROPERTY), Some(&Value::Bool(true)));
        assert_eq!(result.property(STATUS_PROPERTY), Some(&Value::from("OFF")));
        assert!(!producer.switch().is_on());
    }

    #[tokio::test]
    async fn test_invalid_status_reports_failure() {
        let producer = Arc::new(EventProducer::new(Arc::new(LocalBus::new(8)), local()));
        let handler = SwitchCommandHandler::producer(producer.clone(), local());

        let command = Command::new(PRODUCER_SWITCH_COMMAND).with_property(STATUS_PROPERTY, "sideways");
        let result = handler.execute(&command).await.unwrap();
        assert_eq!(result.property(SUCCESS_PROPERTY), Some(&Value::Bool(false)));
        assert!(producer.switch().is_on());
    }

    #[tokio::test]
    async fn test_consumer_switch() {
        let registry = Arc::new(HandlerRegistry::new());
        let dispatcher = Arc::new(EventDispatcher::new(registry, &DispatchConfig::default()).unwrap());
        let consumer = Arc::new(EventConsumer::new(dispatcher, local()));
        let handler = SwitchCommandHandler::consumer(consumer.clone(), local());

        let command = Command::new(CONSUMER_SWITCH_COMMAND).with_property(STATUS_PROPERTY, false);
        handler.execute(&command).await.unwrap();
        assert!(!consumer.switch().is_on());
    }

    #[tokio::test]
    async fn test_manage_handlers_lists_and_toggles() {
        let properties = Arc::new(InMemoryProperties::new());
        let registry = Arc::new(HandlerRegistry::with_properties(properties.clone()));
        let store = Arc::new(PendingCommandStore::new());
        let dispatcher = Arc::new(EventDispatcher::new(registry.clone(), &DispatchConfig::default()).unwrap());
        let producer = Arc::new(EventProducer::new(Arc::new(LocalBus::new(8)), local()));
        let consumer = Arc::new(EventConsumer::new(dispatcher, local()));
        install_control_handlers(&registry, &producer, &consumer, properties.clone(), &store);
        assert_eq!(registry.len(), 6);

        let handler = ManageHandlersCommandHandler::new(&registry, properties.clone(), local());
        let listing = handler.execute(&Command::new(MANAGE_HANDLERS_COMMAND)).await.unwrap();
        let handlers = listing.property(HANDLERS_PROPERTY).and_then(Value::as_object).unwrap();
        assert_eq!(handlers.len(), 6);
        assert_eq!(handlers["producer-switch-handler"], Value::from("ON"));

        let command = Command::new(MANAGE_HANDLERS_COMMAND)
            .with_property(HANDLER_PROPERTY, "producer-switch-handler")
            .with_property(STATUS_PROPERTY, "off");
        let result = handler.execute(&command).await.unwrap();
        let handlers = result.property(HANDLERS_PROPERTY).and_then(Value::as_object).unwrap();
        assert_eq!(handlers["producer-switch-handler"], Value::from("OFF"));
        assert_eq!(
            properties.get("handler.producer-switch-handler").as_deref(),
            Some("false")
        );
        assert!(registry.lookup_type(PRODUCER_SWITCH_COMMAND).is_none());
    }

    #[tokio::test]
    async fn test_manage_unknown_handler_fails() {
        let registry = Arc::new(HandlerRegistry::new());
        let handler =
            ManageHandlersCommandHandler::new(&registry, Arc::new(InMemoryProperties::new()), local());

        let command = Command::new(MANAGE_HANDLERS_COMMAND)
            .with_property(HANDLER_PROPERTY, "missing")
            .with_property(STATUS_PROPERTY, "on");
        let result = handler.execute(&command).await.unwrap();
        assert_eq!(result.property(SUCCESS_PROPERTY), Some(&Value::Bool(false)));
    }
}
