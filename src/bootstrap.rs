//! # Node Bootstrap
//!
//! Wires the coordination components of one node around a transport:
//!
//! ```text
//! LocalBus ──► EventConsumer ──► EventDispatcher ──► HandlerRegistry
//!    ▲                                                   │
//!    └── EventProducer ◄── ExecutionContext / handlers ◄─┘
//! ```
//!
//! Control command handlers and their result handlers are bound
//! automatically.

use crate::cluster::{InMemoryGroupManager, Node};
use crate::config::ConfigManager;
use crate::control::install_control_handlers;
use crate::error::Result;
use crate::events::consumer::EventConsumer;
use crate::events::dispatcher::{DispatchStats, EventDispatcher};
use crate::events::handler::EventHandler;
use crate::events::producer::EventProducer;
use crate::events::registry::HandlerRegistry;
use crate::events::transport::LocalBus;
use crate::execution::command::{Command, CommandResults};
use crate::execution::context::{CommandOutcome, ExecutionContext};
use crate::execution::handler::{CommandHandler, CommandHandlerAdapter, ResultHandler};
use crate::execution::store::PendingCommandStore;
use crate::logging::init_structured_logging;
use crate::policy::AccessPolicy;
use crate::properties::PropertySource;
use crate::switch::SwitchStatus;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// A running node and every component it is made of
pub struct MeshNode {
    pub config_manager: Arc<ConfigManager>,
    pub local_node: Node,
    pub properties: Arc<dyn PropertySource>,
    pub groups: Arc<InMemoryGroupManager>,
    pub registry: Arc<HandlerRegistry>,
    pub dispatcher: Arc<EventDispatcher>,
    pub consumer: Arc<EventConsumer>,
    pub producer: Arc<EventProducer>,
    pub store: Arc<PendingCommandStore>,
    pub context: ExecutionContext,
    pub policy: AccessPolicy,
}

/// Snapshot of a node's state
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub node_id: String,
    pub producer: SwitchStatus,
    pub consumer: SwitchStatus,
    pub consuming: bool,
    pub handlers: BTreeMap<String, SwitchStatus>,
    pub pending_commands: usize,
    pub dispatch: DispatchStats,
}

impl MeshNode {
    /// Build a node on `bus` and start consuming. Must run inside a Tokio
    /// runtime.
    pub fn start(config_manager: Arc<ConfigManager>, bus: &LocalBus) -> Result<MeshNode> {
        init_structured_logging();

        let config = config_manager.config();
        let local_node = config.node.to_node();
        info!(node = %local_node, "Bootstrapping node");

        let properties = config_manager.property_source();
        let groups = Arc::new(InMemoryGroupManager::new(local_node.clone()));
        let registry = Arc::new(HandlerRegistry::with_properties(properties.clone()));
        let dispatcher = Arc::new(EventDispatcher::new(registry.clone(), &config.dispatch)?);
        let consumer = Arc::new(EventConsumer::new(dispatcher.clone(), local_node.clone()));
        let producer = Arc::new(EventProducer::new(Arc::new(bus.clone()), local_node.clone()));
        let store = Arc::new(PendingCommandStore::new());
        let context = ExecutionContext::bound(config.commands.clone(), store.clone(), producer.clone());
        let policy = AccessPolicy::new(properties.clone()).with_group_provider(groups.clone());

        install_control_handlers(&registry, &producer, &consumer, properties.clone(), &store);
        consumer.start(bus.subscribe());

        info!(
            node = %local_node,
            handlers = registry.len(),
            "Node started"
        );

        Ok(MeshNode {
            config_manager,
            local_node,
            properties,
            groups,
            registry,
            dispatcher,
            consumer,
            producer,
            store,
            context,
            policy,
        })
    }

    /// Bind a plain event handler
    pub fn bind_handler(&self, handler: Arc<dyn EventHandler>) {
        self.registry.bind(handler);
    }

    /// Bind a command handler together with the result handler correlating
    /// its answers on this node
    pub fn bind_command_handler(&self, handler: Arc<dyn CommandHandler>) {
        let result_type = handler.result_type().to_string();
        self.registry
            .bind(Arc::new(CommandHandlerAdapter::new(handler, self.producer.clone())));
        if !self.registry.has_handler(&result_type) {
            self.registry
                .bind(Arc::new(ResultHandler::new(result_type, self.store.clone())));
        }
    }

    pub async fn execute(&self, command: Command) -> Result<CommandResults> {
        self.context.execute(command).await
    }

    pub async fn execute_outcome(&self, command: Command) -> Result<CommandOutcome> {
        self.context.execute_outcome(command).await
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            node_id: self.local_node.id.clone(),
            producer: self.producer.switch().status(),
            consumer: self.consumer.switch().status(),
            consuming: self.consumer.is_consuming(),
            handlers: self.registry.statuses(),
            pending_commands: self.store.len(),
            dispatch: self.dispatcher.stats(),
        }
    }

    /// Stop consuming and close the dispatcher
    pub fn stop(&self) {
        self.consumer.stop();
        self.dispatcher.shutdown();
        info!(node = %self.local_node, "Node stopped");
    }
}
