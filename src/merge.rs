//! # Merge Resolver
//!
//! Reconciles two concurrent values of the same replicated key, e.g. after
//! a partition heals. Rules, first match wins:
//!
//! 1. one side absent: the other side
//! 2. both node containers: existing container with the union of members
//! 3. both sets: union, incoming elements first
//! 4. both lists: existing followed by incoming, no dedup
//! 5. both text and at least one `MERGABLE[...]`: tagged union of items
//! 6. anything else: the existing value
//!
//! Merging is total; there is no failure case.

use crate::cluster::{Group, MultiNode};
use crate::constants::{DELIMITER, MERGABLE_PREFIX, MERGABLE_SUFFIX};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::hash::Hash;
use tracing::trace;

/// Value stored under a replicated key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ReplicatedValue {
    Scalar(Value),
    /// Plain string, union-merged when tagged `MERGABLE[...]`
    Text(String),
    Set(IndexSet<String>),
    List(Vec<String>),
    /// Multi-node container
    Nodes(Group),
}

impl ReplicatedValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ReplicatedValue::Scalar(_) => "scalar",
            ReplicatedValue::Text(_) => "text",
            ReplicatedValue::Set(_) => "set",
            ReplicatedValue::List(_) => "list",
            ReplicatedValue::Nodes(_) => "nodes",
        }
    }

    /// Tagged text built from items
    pub fn mergable<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: IndexSet<String> = items.into_iter().map(Into::into).collect();
        ReplicatedValue::Text(string_from_set(&items, true))
    }
}

impl From<&str> for ReplicatedValue {
    fn from(text: &str) -> Self {
        ReplicatedValue::Text(text.to_string())
    }
}

impl From<String> for ReplicatedValue {
    fn from(text: String) -> Self {
        ReplicatedValue::Text(text)
    }
}

impl From<Group> for ReplicatedValue {
    fn from(group: Group) -> Self {
        ReplicatedValue::Nodes(group)
    }
}

/// Deterministic reconciliation of replicated values
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeResolver;

impl MergeResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the value of `key` given the incoming and existing replicas
    pub fn merge(
        &self,
        key: &str,
        incoming: Option<ReplicatedValue>,
        existing: Option<ReplicatedValue>,
    ) -> Option<ReplicatedValue> {
        let (incoming, existing) = match (incoming, existing) {
            (None, existing) => return existing,
            (incoming, None) => return incoming,
            (Some(incoming), Some(existing)) => (incoming, existing),
        };
        trace!(
            key = %key,
            incoming = incoming.kind(),
            existing = existing.kind(),
            "Merging replicated entry"
        );

        let resolved = match (incoming, existing) {
            (ReplicatedValue::Nodes(incoming), ReplicatedValue::Nodes(mut existing)) => {
                let nodes = union(incoming.nodes(), existing.nodes());
                existing.set_nodes(nodes);
                ReplicatedValue::Nodes(existing)
            }
            (ReplicatedValue::Set(incoming), ReplicatedValue::Set(existing)) => {
                ReplicatedValue::Set(union(&incoming, &existing))
            }
            (ReplicatedValue::List(incoming), ReplicatedValue::List(mut existing)) => {
                existing.extend(incoming);
                ReplicatedValue::List(existing)
            }
            (ReplicatedValue::Text(incoming), ReplicatedValue::Text(existing))
                if is_mergable(&incoming) || is_mergable(&existing) =>
            {
                ReplicatedValue::Text(merge_text(&incoming, existing))
            }
            (_, existing) => existing,
        };
        Some(resolved)
    }

    /// Merge every key of `incoming` into `existing`
    pub fn reconcile(
        &self,
        existing: &mut IndexMap<String, ReplicatedValue>,
        incoming: IndexMap<String, ReplicatedValue>,
    ) {
        for (key, value) in incoming {
            let current = existing.get(&key).cloned();
            match self.merge(&key, Some(value), current) {
                Some(resolved) => {
                    existing.insert(key, resolved);
                }
                None => {
                    existing.shift_remove(&key);
                }
            }
        }
    }
}

fn union<T: Clone + Eq + Hash>(first: &IndexSet<T>, second: &IndexSet<T>) -> IndexSet<T> {
    first.iter().chain(second.iter()).cloned().collect()
}

fn merge_text(incoming: &str, existing: String) -> String {
    let mut items = set_from_string(incoming);
    items.extend(set_from_string(&existing));
    if items.is_empty() {
        existing
    } else {
        string_from_set(&items, true)
    }
}

/// Whether a string carries the `MERGABLE[...]` marker
pub fn is_mergable(text: &str) -> bool {
    text.len() >= MERGABLE_PREFIX.len() + MERGABLE_SUFFIX.len()
        && text.starts_with(MERGABLE_PREFIX)
        && text.ends_with(MERGABLE_SUFFIX)
}

/// Items of a (possibly tagged) comma-separated string, trimmed, without
/// empties, in first-seen order
pub fn set_from_string(text: &str) -> IndexSet<String> {
    let body = if is_mergable(text) {
        &text[MERGABLE_PREFIX.len()..text.len() - MERGABLE_SUFFIX.len()]
    } else {
        text
    };
    body.split(DELIMITER)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join items with commas, tagging the result when `mergable`
pub fn string_from_set<S: AsRef<str>>(items: &IndexSet<S>, mergable: bool) -> String
where
    S: Hash + Eq,
{
    let joined = items
        .iter()
        .map(|item| item.as_ref())
        .collect::<Vec<&str>>()
        .join(DELIMITER);
    if mergable {
        format!("{MERGABLE_PREFIX}{joined}{MERGABLE_SUFFIX}")
    } else {
        joined
    }
}

/// Same elements, ignoring order and multiplicity
pub fn collection_equals<'a, T, A, B>(a: A, b: B) -> bool
where
    T: Eq + Hash + 'a,
    A: IntoIterator<Item = &'a T> + Clone,
    B: IntoIterator<Item = &'a T> + Clone,
{
    collection_subset(a.clone(), b.clone()) && collection_subset(b, a)
}

/// Every element of `source` is contained in `target`
pub fn collection_subset<'a, T, A, B>(source: A, target: B) -> bool
where
    T: Eq + Hash + 'a,
    A: IntoIterator<Item = &'a T>,
    B: IntoIterator<Item = &'a T>,
{
    let target: std::collections::HashSet<&T> = target.into_iter().collect();
    source.into_iter().all(|item| target.contains(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Node;

    fn set(items: &[&str]) -> ReplicatedValue {
        ReplicatedValue::Set(items.iter().map(|s| s.to_string()).collect())
    }

    fn list(items: &[&str]) -> ReplicatedValue {
        ReplicatedValue::List(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_absent_side_returns_other() {
        let resolver = MergeResolver::new();
        assert_eq!(resolver.merge("k", Some(set(&["a"])), None), Some(set(&["a"])));
        assert_eq!(resolver.merge("k", None, Some(list(&["b"]))), Some(list(&["b"])));
        assert_eq!(resolver.merge("k", None, None), None);
    }

    #[test]
    fn test_sets_union_incoming_first() {
        let merged = MergeResolver::new()
            .merge("k", Some(set(&["c", "a"])), Some(set(&["a", "b"])))
            .unwrap();
        match merged {
            ReplicatedValue::Set(items) => {
                assert_eq!(items.into_iter().collect::<Vec<_>>(), vec!["c", "a", "b"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_lists_concatenate_existing_first() {
        let merged = MergeResolver::new().merge("k", Some(list(&["x", "y"])), Some(list(&["a", "x"])));
        assert_eq!(merged, Some(list(&["a", "x", "x", "y"])));
    }

    #[test]
    fn test_node_containers_keep_existing_identity() {
        let n1 = Node::new("n1", "127.0.0.1", 5701);
        let n2 = Node::new("n2", "127.0.0.1", 5702);
        let incoming = Group::new("incoming").with_node(n2.clone());
        let existing = Group::new("default").with_parent("root").with_node(n1.clone());

        let merged = MergeResolver::new()
            .merge("default", Some(incoming.into()), Some(existing.into()))
            .unwrap();
        match merged {
            ReplicatedValue::Nodes(group) => {
                assert_eq!(group.name, "default");
                assert_eq!(group.parent.as_deref(), Some("root"));
                assert_eq!(group.nodes.into_iter().collect::<Vec<_>>(), vec![n2, n1]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_node_container_equality_sees_membership() {
        let n1 = Node::new("n1", "127.0.0.1", 5701);
        let n2 = Node::new("n2", "127.0.0.1", 5702);
        let existing = Group::new("default").with_node(n1.clone());

        let merged = MergeResolver::new().merge(
            "default",
            Some(Group::new("default").with_node(n2.clone()).into()),
            Some(existing.clone().into()),
        );
        let expected = Group::new("default").with_node(n1).with_node(n2);
        assert_eq!(merged, Some(expected.into()));
        assert_ne!(merged, Some(existing.into()));
    }

    #[test]
    fn test_mergable_text_union() {
        let resolver = MergeResolver::new();
        let merged = resolver.merge("k", Some("MERGABLE[b,c]".into()), Some("a,b".into()));
        assert_eq!(merged, Some("MERGABLE[b,c,a]".into()));

        let merged = resolver.merge("k", Some("x".into()), Some("MERGABLE[a]".into()));
        assert_eq!(merged, Some("MERGABLE[x,a]".into()));
    }

    #[test]
    fn test_plain_text_and_mismatched_shapes_keep_existing() {
        let resolver = MergeResolver::new();
        assert_eq!(
            resolver.merge("k", Some("new".into()), Some("old".into())),
            Some("old".into())
        );
        assert_eq!(
            resolver.merge("k", Some(set(&["a"])), Some(list(&["b"]))),
            Some(list(&["b"]))
        );
        assert_eq!(
            resolver.merge(
                "k",
                Some(ReplicatedValue::Scalar(Value::from(1))),
                Some(ReplicatedValue::Scalar(Value::from(2)))
            ),
            Some(ReplicatedValue::Scalar(Value::from(2)))
        );
    }

    #[test]
    fn test_empty_mergable_strings_keep_existing() {
        let merged = MergeResolver::new().merge("k", Some("MERGABLE[]".into()), Some(" , ".into()));
        assert_eq!(merged, Some(" , ".into()));
    }

    #[test]
    fn test_reconcile_map() {
        let mut existing = IndexMap::new();
        existing.insert("features".to_string(), set(&["a"]));
        existing.insert("only-local".to_string(), list(&["x"]));

        let mut incoming = IndexMap::new();
        incoming.insert("features".to_string(), set(&["b"]));
        incoming.insert("only-remote".to_string(), ReplicatedValue::from("v"));

        MergeResolver::new().reconcile(&mut existing, incoming);
        assert_eq!(existing.len(), 3);
        assert_eq!(existing["features"], set(&["b", "a"]));
        assert_eq!(existing["only-remote"], ReplicatedValue::from("v"));
    }

    #[test]
    fn test_mergable_helpers() {
        assert!(is_mergable("MERGABLE[a,b]"));
        assert!(is_mergable("MERGABLE[]"));
        assert!(!is_mergable("a,b"));
        assert!(!is_mergable("MERGABLE[a"));

        let items = set_from_string("MERGABLE[ a, b,,a ]");
        assert_eq!(items.iter().map(String::as_str).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(string_from_set(&items, false), "a,b");
        assert_eq!(string_from_set(&items, true), "MERGABLE[a,b]");
        assert_eq!(ReplicatedValue::mergable(["x", "y"]), ReplicatedValue::from("MERGABLE[x,y]"));
    }

    #[test]
    fn test_collection_comparisons() {
        let a = vec!["x", "y"];
        let b = vec!["y", "x", "x"];
        let c = vec!["x"];
        assert!(collection_equals(&a, &b));
        assert!(collection_subset(&c, &a));
        assert!(!collection_subset(&a, &c));
        assert!(!collection_equals(&a, &c));
    }
}
