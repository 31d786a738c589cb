//! # Cluster Membership Model
//!
//! Nodes and groups as seen by the coordination core. Membership itself is
//! owned by an external component exposed through [`GroupProvider`];
//! [`InMemoryGroupManager`] is a self-contained implementation used for
//! embedding and tests.

use crate::constants::DEFAULT_GROUP_NAME;
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::{debug, info};

/// A cluster member. Equality and hashing use the id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub alias: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Node {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            alias: None,
            host: host.into(),
            port,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} ({alias}@{}:{})", self.id, self.host, self.port),
            None => write!(f, "{}@{}:{}", self.id, self.host, self.port),
        }
    }
}

/// A replicated value whose payload is a set of nodes
pub trait MultiNode {
    fn nodes(&self) -> &IndexSet<Node>;
    fn set_nodes(&mut self, nodes: IndexSet<Node>);
}

/// A named set of nodes, optionally nested under a parent group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub nodes: IndexSet<Node>,
    pub parent: Option<String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexSet::new(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.insert(node);
        self
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.nodes.contains(node)
    }
}

/// Groups are equal when name, parent and membership agree. Membership
/// compares as a set, so node order does not matter.
impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.parent == other.parent && self.nodes == other.nodes
    }
}

impl Eq for Group {}

impl Hash for Group {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl MultiNode for Group {
    fn nodes(&self) -> &IndexSet<Node> {
        &self.nodes
    }

    fn set_nodes(&mut self, nodes: IndexSet<Node>) {
        self.nodes = nodes;
    }
}

/// Read-only membership accessors supplied by the membership component
pub trait GroupProvider: Send + Sync {
    fn find_group_by_name(&self, name: &str) -> Option<Group>;

    fn list_groups(&self) -> Vec<Group>;

    fn list_nodes(&self) -> Vec<Node>;

    /// The node this process runs as
    fn local_node(&self) -> Node;

    /// Groups the local node belongs to
    fn list_local_groups(&self) -> Vec<Group> {
        let local = self.local_node();
        self.list_groups()
            .into_iter()
            .filter(|g| g.contains(&local))
            .collect()
    }
}

/// In-process group manager
#[derive(Debug)]
pub struct InMemoryGroupManager {
    local: Node,
    groups: RwLock<IndexMap<String, Group>>,
}

impl InMemoryGroupManager {
    /// Create a manager whose local node is a member of the default group
    pub fn new(local: Node) -> Self {
        let default_group = Group::new(DEFAULT_GROUP_NAME).with_node(local.clone());
        let mut groups = IndexMap::new();
        groups.insert(default_group.name.clone(), default_group);
        Self {
            local,
            groups: RwLock::new(groups),
        }
    }

    /// Create a group if it does not exist yet and return it
    pub fn create_group(&self, name: &str) -> Group {
        let mut groups = self.groups.write();
        groups
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(group = name, "Created cluster group");
                Group::new(name)
            })
            .clone()
    }

    /// Insert or replace a group definition
    pub fn register_group(&self, group: Group) {
        self.groups.write().insert(group.name.clone(), group);
    }

    pub fn delete_group(&self, name: &str) -> Option<Group> {
        let removed = self.groups.write().shift_remove(name);
        if removed.is_some() {
            info!(group = name, "Deleted cluster group");
        }
        removed
    }

    /// Add a node to a group, creating the group when needed
    pub fn join(&self, name: &str, node: Node) {
        let mut groups = self.groups.write();
        let group = groups
            .entry(name.to_string())
            .or_insert_with(|| Group::new(name));
        if group.nodes.insert(node.clone()) {
            debug!(group = name, node = %node.id, "Node joined group");
        }
    }

    /// Remove a node from a group; the local node falls back to the default
    /// group when it leaves its last group
    pub fn quit(&self, name: &str, node: &Node) {
        let mut groups = self.groups.write();
        if let Some(group) = groups.get_mut(name) {
            if group.nodes.shift_remove(node) {
                debug!(group = name, node = %node.id, "Node quit group");
            }
        }

        if node == &self.local && !groups.values().any(|g| g.contains(&self.local)) {
            groups
                .entry(DEFAULT_GROUP_NAME.to_string())
                .or_insert_with(|| Group::new(DEFAULT_GROUP_NAME))
                .nodes
                .insert(self.local.clone());
        }
    }
}

impl GroupProvider for InMemoryGroupManager {
    fn find_group_by_name(&self, name: &str) -> Option<Group> {
        self.groups.read().get(name).cloned()
    }

    fn list_groups(&self) -> Vec<Group> {
        self.groups.read().values().cloned().collect()
    }

    fn list_nodes(&self) -> Vec<Node> {
        let groups = self.groups.read();
        let mut nodes: IndexSet<Node> = IndexSet::new();
        nodes.insert(self.local.clone());
        for group in groups.values() {
            nodes.extend(group.nodes.iter().cloned());
        }
        nodes.into_iter().collect()
    }

    fn local_node(&self) -> Node {
        self.local.clone()
    }
}
