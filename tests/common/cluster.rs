//! Multi-node test cluster on a shared in-process bus

use async_trait::async_trait;
use meshsync::config::{ConfigManager, MeshConfig, PoolMode};
use meshsync::execution::{Command, CommandHandler, CommandResult};
use meshsync::{LocalBus, MeshNode, Node, Result, Switch};
use std::collections::HashMap;
use std::sync::Arc;

pub const ECHO_COMMAND: &str = "echo";
pub const ECHO_RESULT: &str = "echo-result";

/// Configuration for one test node with fast dispatch polling
pub fn node_config(index: usize) -> MeshConfig {
    let mut config = MeshConfig::default();
    config.node.id = Some(format!("node-{index}"));
    config.node.port = 5701 + index as u16;
    config.dispatch.interval_ms = 10;
    config.dispatch.timeout_ms = 300;
    config.dispatch.pool = PoolMode::Cached;
    config.commands.default_timeout_ms = 2_000;
    config
}

/// Nodes sharing one bus
pub struct TestCluster {
    pub bus: LocalBus,
    pub nodes: Vec<MeshNode>,
}

impl TestCluster {
    /// Start `size` nodes, each with an echo command handler bound
    pub fn start(size: usize) -> Self {
        Self::start_with(size, |_, _| {})
    }

    /// Start `size` nodes, letting the caller adjust each configuration
    pub fn start_with(size: usize, customize: impl Fn(usize, &mut MeshConfig)) -> Self {
        let bus = LocalBus::new(256);
        let nodes = (0..size)
            .map(|index| {
                let mut config = node_config(index);
                customize(index, &mut config);
                let manager = ConfigManager::from_config(config).expect("valid test config");
                let node = MeshNode::start(manager, &bus).expect("node starts");
                node.bind_command_handler(Arc::new(EchoHandler::new(node.local_node.clone())));
                node
            })
            .collect();
        Self { bus, nodes }
    }

    pub fn node(&self, index: usize) -> &MeshNode {
        &self.nodes[index]
    }

    pub fn members(&self) -> Vec<Node> {
        self.nodes.iter().map(|n| n.local_node.clone()).collect()
    }

    pub fn stop(&self) {
        for node in &self.nodes {
            node.stop();
        }
    }
}

/// A node that exists in no cluster and never answers
pub fn ghost_node() -> Node {
    Node::new("ghost", "10.255.255.1", 5701)
}

/// Answers echo commands with the responding node id and the `text` property
pub struct EchoHandler {
    local: Node,
    switch: Switch,
}

impl EchoHandler {
    pub fn new(local: Node) -> Self {
        Self {
            local,
            switch: Switch::new("echo-handler"),
        }
    }
}

#[async_trait]
impl CommandHandler for EchoHandler {
    fn command_type(&self) -> &str {
        ECHO_COMMAND
    }

    fn result_type(&self) -> &str {
        ECHO_RESULT
    }

    fn name(&self) -> &str {
        "echo-handler"
    }

    fn switch(&self) -> &Switch {
        &self.switch
    }

    async fn execute(&self, command: &Command) -> Result<CommandResult> {
        let text = command.event.property_str("text").unwrap_or_default().to_string();
        Ok(CommandResult::reply_to(command, ECHO_RESULT, self.local.clone())
            .with_property("responder", self.local.id.clone())
            .with_property("text", text))
    }
}

/// Responder ids of a result map, sorted
pub fn responders(results: &HashMap<Node, CommandResult>) -> Vec<String> {
    let mut ids: Vec<String> = results.keys().map(|n| n.id.clone()).collect();
    ids.sort();
    ids
}
