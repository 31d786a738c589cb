//! Event envelope shared by plain events, commands and results.

use crate::cluster::Node;
use crate::execution::command::{Command, CommandResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// Propagation direction used by the access policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cluster event
///
/// `event_type` is the tag handlers are looked up by. `force` marks events
/// that bypass access policy and switched-off producers/consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event_type: String,
    pub source_group: Option<String>,
    pub source_node: Option<Node>,
    /// Target nodes; `None` means every node
    pub destination: Option<HashSet<Node>>,
    pub force: bool,
    pub properties: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Create a new event with a generated id
    pub fn new(event_type: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), event_type)
    }

    pub fn with_id(id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            source_group: None,
            source_node: None,
            destination: None,
            force: false,
            properties: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_source_group(mut self, group: impl Into<String>) -> Self {
        self.source_group = Some(group.into());
        self
    }

    pub fn with_source_node(mut self, node: Node) -> Self {
        self.source_node = Some(node);
        self
    }

    pub fn with_destination<I: IntoIterator<Item = Node>>(mut self, nodes: I) -> Self {
        self.destination = Some(nodes.into_iter().collect());
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Whether the given node is an addressee of this event
    pub fn is_addressed_to(&self, node: &Node) -> bool {
        self.destination
            .as_ref()
            .map_or(true, |nodes| nodes.contains(node))
    }
}

/// Everything that travels over the transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body")]
pub enum ClusterMessage {
    Event(Event),
    Command(Command),
    Result(CommandResult),
}

impl ClusterMessage {
    /// Shared event header
    pub fn header(&self) -> &Event {
        match self {
            ClusterMessage::Event(event) => event,
            ClusterMessage::Command(command) => &command.event,
            ClusterMessage::Result(result) => &result.event,
        }
    }

    pub fn header_mut(&mut self) -> &mut Event {
        match self {
            ClusterMessage::Event(event) => event,
            ClusterMessage::Command(command) => &mut command.event,
            ClusterMessage::Result(result) => &mut result.event,
        }
    }

    /// Type tag handlers are registered under
    pub fn event_type(&self) -> &str {
        &self.header().event_type
    }

    pub fn id(&self) -> &str {
        &self.header().id
    }

    /// Commands and results are always forced
    pub fn is_forced(&self) -> bool {
        match self {
            ClusterMessage::Event(event) => event.force,
            ClusterMessage::Command(_) | ClusterMessage::Result(_) => true,
        }
    }

    pub fn as_command(&self) -> Option<&Command> {
        match self {
            ClusterMessage::Command(command) => Some(command),
            _ => None,
        }
    }

    pub fn as_result(&self) -> Option<&CommandResult> {
        match self {
            ClusterMessage::Result(result) => Some(result),
            _ => None,
        }
    }
}

impl From<Event> for ClusterMessage {
    fn from(event: Event) -> Self {
        ClusterMessage::Event(event)
    }
}

impl From<Command> for ClusterMessage {
    fn from(command: Command) -> Self {
        ClusterMessage::Command(command)
    }
}

impl From<CommandResult> for ClusterMessage {
    fn from(result: CommandResult) -> Self {
        ClusterMessage::Result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builder() {
        let node = Node::new("n1", "127.0.0.1", 5701);
        let event = Event::new("config-update")
            .with_source_group("default")
            .with_source_node(node.clone())
            .with_property("pid", "org.example.cfg");

        assert_eq!(event.event_type, "config-update");
        assert!(!event.force);
        assert_eq!(event.property_str("pid"), Some("org.example.cfg"));
        assert!(event.is_addressed_to(&node));
    }

    #[test]
    fn test_destination_filters_addressees() {
        let n1 = Node::new("n1", "127.0.0.1", 5701);
        let n2 = Node::new("n2", "127.0.0.1", 5702);
        let event = Event::new("x").with_destination([n1.clone()]);

        assert!(event.is_addressed_to(&n1));
        assert!(!event.is_addressed_to(&n2));
    }

    #[test]
    fn test_message_wire_format_is_tagged() {
        let message = ClusterMessage::from(Event::with_id("e-1", "bundle-event"));
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["kind"], "Event");
        assert_eq!(json["body"]["event_type"], "bundle-event");
        assert!(!message.is_forced());
    }
}
