//! Command and result messages plus the in-flight aggregation state.

use crate::cluster::Node;
use crate::events::types::Event;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Results collected for a command, keyed by responding node
pub type CommandResults = HashMap<Node, CommandResult>;

/// Cluster-wide request awaiting correlated responses
///
/// Commands are always forced: they bypass access policy and switched-off
/// producers and consumers.
///
/// ```rust
/// use meshsync::cluster::Node;
/// use meshsync::execution::Command;
///
/// let command = Command::new("producer-switch")
///     .with_destination([Node::new("n2", "10.0.0.2", 5701)])
///     .with_timeout_ms(2_000)
///     .with_property("status", "off");
///
/// assert!(command.event.force);
/// assert_eq!(command.destination().map(|d| d.len()), Some(1));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub event: Event,
    /// Result wait; the execution context default applies when unset
    pub timeout_ms: Option<u64>,
}

impl Command {
    pub fn new(command_type: impl Into<String>) -> Self {
        Self {
            event: Event::new(command_type).with_force(true),
            timeout_ms: None,
        }
    }

    pub fn with_id(id: impl Into<String>, command_type: impl Into<String>) -> Self {
        Self {
            event: Event::with_id(id, command_type).with_force(true),
            timeout_ms: None,
        }
    }

    pub fn with_destination<I: IntoIterator<Item = Node>>(mut self, nodes: I) -> Self {
        self.event = self.event.with_destination(nodes);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_source_group(mut self, group: impl Into<String>) -> Self {
        self.event = self.event.with_source_group(group);
        self
    }

    pub fn with_source_node(mut self, node: Node) -> Self {
        self.event = self.event.with_source_node(node);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event = self.event.with_property(key, value);
        self
    }

    pub fn id(&self) -> &str {
        &self.event.id
    }

    pub fn command_type(&self) -> &str {
        &self.event.event_type
    }

    /// Target nodes; `None` broadcasts to every node
    pub fn destination(&self) -> Option<&HashSet<Node>> {
        self.event.destination.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Response to a [`Command`], correlated by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub event: Event,
}

impl CommandResult {
    /// Build the result for `command`, sent from `source_node` back to the
    /// command's originator
    pub fn reply_to(command: &Command, result_type: impl Into<String>, source_node: Node) -> Self {
        let mut event = Event::with_id(command.id(), result_type)
            .with_force(true)
            .with_source_node(source_node);
        if let Some(group) = &command.event.source_group {
            event = event.with_source_group(group.clone());
        }
        if let Some(origin) = &command.event.source_node {
            event = event.with_destination([origin.clone()]);
        }
        Self { event }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event = self.event.with_property(key, value);
        self
    }

    pub fn id(&self) -> &str {
        &self.event.id
    }

    pub fn result_type(&self) -> &str {
        &self.event.event_type
    }

    pub fn source_node(&self) -> Option<&Node> {
        self.event.source_node.as_ref()
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.event.property(key)
    }
}

/// A command registered in the store while its results are collected
///
/// Results are delivered to the waiting caller through a single-use channel.
/// The `completed` flag is flipped with a compare-exchange before the sender
/// is taken, so concurrent completion and expiry deliver exactly once.
pub struct PendingCommand {
    command: Command,
    results: Mutex<CommandResults>,
    completed: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<CommandResults>>>,
}

impl PendingCommand {
    /// Create the pending entry and the receiver the caller waits on
    pub fn new(command: Command) -> (Self, oneshot::Receiver<CommandResults>) {
        let (tx, rx) = oneshot::channel();
        let pending = Self {
            command,
            results: Mutex::new(HashMap::new()),
            completed: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
        };
        (pending, rx)
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn id(&self) -> &str {
        self.command.id()
    }

    /// Merge incoming results, keyed by their source node (last one wins).
    ///
    /// Returns `true` if this call completed the command. Results without a
    /// source node cannot be attributed and are skipped. Broadcast commands
    /// never complete here; only expiry completes them.
    pub fn add_results<I: IntoIterator<Item = CommandResult>>(&self, incoming: I) -> bool {
        if self.is_completed() {
            trace!(command_id = %self.id(), "Result arrived after completion, ignored");
            return false;
        }

        let snapshot = {
            let mut results = self.results.lock();
            for result in incoming {
                match result.source_node().cloned() {
                    Some(node) => {
                        results.insert(node, result);
                    }
                    None => {
                        debug!(command_id = %self.id(), "Result without source node skipped");
                    }
                }
            }

            match self.command.destination() {
                Some(destination) if results.len() >= destination.len() => results.clone(),
                _ => return false,
            }
        };

        self.complete(snapshot)
    }

    /// Force completion with whatever has accumulated so far
    pub fn on_timeout(&self) -> bool {
        let snapshot = self.results.lock().clone();
        self.complete(snapshot)
    }

    fn complete(&self, results: CommandResults) -> bool {
        if self
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if let Some(sender) = self.sender.lock().take() {
            // Receiver gone means the caller was cancelled; nothing to deliver to.
            let _ = sender.send(results);
        }
        true
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Copy of the results collected so far
    pub fn snapshot(&self) -> CommandResults {
        self.results.lock().clone()
    }

    pub fn received(&self) -> usize {
        self.results.lock().len()
    }
}

impl std::fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCommand")
            .field("id", &self.id())
            .field("command_type", &self.command.command_type())
            .field("received", &self.received())
            .field("completed", &self.is_completed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn node(id: &str, port: u16) -> Node {
        Node::new(id, "127.0.0.1", port)
    }

    fn result_from(command: &Command, from: &Node) -> CommandResult {
        CommandResult::reply_to(command, "status-result", from.clone())
    }

    #[test]
    fn test_command_defaults() {
        let command = Command::new("status");
        assert!(command.event.force);
        assert!(command.timeout().is_none());
        assert!(command.destination().is_none());
    }

    #[test]
    fn test_reply_targets_originator() {
        let origin = node("n1", 5701);
        let command = Command::new("status")
            .with_source_node(origin.clone())
            .with_source_group("default");
        let result = result_from(&command, &node("n2", 5702));

        assert_eq!(result.id(), command.id());
        assert!(result.event.force);
        assert_eq!(result.event.source_group.as_deref(), Some("default"));
        assert!(result.event.is_addressed_to(&origin));
        assert!(!result.event.is_addressed_to(&node("n3", 5703)));
    }

    #[tokio::test]
    async fn test_completes_when_every_destination_answered() {
        let (n2, n3) = (node("n2", 5702), node("n3", 5703));
        let command = Command::new("status").with_destination([n2.clone(), n3.clone()]);
        let (pending, rx) = PendingCommand::new(command.clone());

        assert!(!pending.add_results([result_from(&command, &n2)]));
        // Repeated answer from the same node does not count twice
        assert!(!pending.add_results([result_from(&command, &n2)]));
        assert!(pending.add_results([result_from(&command, &n3)]));

        let results = rx.await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(pending.is_completed());
    }

    #[tokio::test]
    async fn test_completion_delivers_once() {
        let n2 = node("n2", 5702);
        let command = Command::new("status").with_destination([n2.clone()]);
        let (pending, rx) = PendingCommand::new(command.clone());

        assert!(pending.add_results([result_from(&command, &n2)]));
        assert!(!pending.on_timeout());
        assert!(!pending.add_results([result_from(&command, &n2)]));

        assert_eq!(rx.await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_results_and_expiry_complete_once() {
        let (n2, n3) = (node("n2", 5702), node("n3", 5703));
        let command = Command::new("status").with_destination([n2.clone(), n3.clone()]);

        for _ in 0..200 {
            let (pending, rx) = PendingCommand::new(command.clone());
            let pending = Arc::new(pending);

            let mut tasks = Vec::new();
            for from in [&n2, &n3] {
                let (pending, result) = (pending.clone(), result_from(&command, from));
                tasks.push(tokio::spawn(async move { pending.add_results([result]) }));
            }
            for _ in 0..2 {
                let pending = pending.clone();
                tasks.push(tokio::spawn(async move { pending.on_timeout() }));
            }

            let mut completions = 0;
            for task in tasks {
                if task.await.unwrap() {
                    completions += 1;
                }
            }

            assert_eq!(completions, 1);
            assert!(pending.is_completed());
            let delivered = rx.await.unwrap();
            assert!(delivered.len() <= 2);
        }
    }

    #[tokio::test]
    async fn test_broadcast_only_completes_on_timeout() {
        let command = Command::new("status");
        let (pending, rx) = PendingCommand::new(command.clone());

        assert!(!pending.add_results([result_from(&command, &node("n2", 5702))]));
        assert!(!pending.is_completed());
        assert!(pending.on_timeout());

        assert_eq!(rx.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_with_nothing_received_delivers_empty_map() {
        let (pending, rx) = PendingCommand::new(Command::new("status"));
        assert!(pending.on_timeout());
        assert!(rx.await.unwrap().is_empty());
    }
}
