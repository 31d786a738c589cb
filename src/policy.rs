//! # Access Policy
//!
//! Whitelist/blacklist filter deciding whether an item (configuration pid,
//! bundle location, feature name, topic) may propagate for a group,
//! category and direction.
//!
//! Lists live in the property source under
//! `<group>.<category>.<whitelist|blacklist>.<inbound|outbound>` as comma
//! separated wildcard patterns. A group inherits every entry of its parent
//! chain in addition to its own.
//!
//! ```rust
//! use meshsync::events::Direction;
//! use meshsync::policy::AccessPolicy;
//! use meshsync::properties::InMemoryProperties;
//! use std::sync::Arc;
//!
//! let properties = Arc::new(InMemoryProperties::with_values([
//!     ("default.config.whitelist.outbound", "org.example.*"),
//!     ("default.config.blacklist.outbound", "org.example.secret"),
//! ]));
//! let policy = AccessPolicy::new(properties);
//!
//! assert!(policy.is_allowed("default", "config", "org.example.web", Direction::Outbound));
//! assert!(!policy.is_allowed("default", "config", "org.example.secret", Direction::Outbound));
//! ```

use crate::cluster::GroupProvider;
use crate::constants::{lists, DELIMITER, PARENT, SEPARATOR};
use crate::events::types::Direction;
use crate::logging::log_policy_decision;
use crate::properties::PropertySource;
use dashmap::DashMap;
use indexmap::IndexSet;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Kind of pattern list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListType {
    Whitelist,
    Blacklist,
}

impl ListType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListType::Whitelist => lists::WHITELIST,
            ListType::Blacklist => lists::BLACKLIST,
        }
    }
}

impl fmt::Display for ListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Property name of a list: `<group>.<category>.<list>.<direction>`
pub fn list_key(list_type: ListType, group: &str, category: &str, direction: Direction) -> String {
    [group, category, list_type.as_str(), direction.as_str()].join(SEPARATOR)
}

/// Split a configured list: newlines removed, comma separated, trimmed,
/// empty items dropped
pub fn parse_list(value: &str) -> IndexSet<String> {
    value
        .replace(['\n', '\r'], "")
        .split(DELIMITER)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Full-string match where `*` stands for any sequence of characters.
/// Every other character matches itself.
pub fn wildcard_match(item: &str, pattern: &str) -> bool {
    match compile_pattern(pattern) {
        Some(regex) => regex.is_match(item),
        None => false,
    }
}

fn compile_pattern(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    match Regex::new(&format!("^(?s:{body})$")) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(pattern = %pattern, error = %e, "Invalid list pattern ignored");
            None
        }
    }
}

/// Whitelist/blacklist filter backed by a property source
pub struct AccessPolicy {
    properties: Arc<dyn PropertySource>,
    groups: Option<Arc<dyn GroupProvider>>,
    /// Compiled patterns, keyed by the raw pattern text
    patterns: DashMap<String, Option<Regex>>,
    /// Serializes list rewrites
    update_lock: Mutex<()>,
}

impl AccessPolicy {
    pub fn new(properties: Arc<dyn PropertySource>) -> Self {
        Self {
            properties,
            groups: None,
            patterns: DashMap::new(),
            update_lock: Mutex::new(()),
        }
    }

    /// Resolve group parents through the membership component first
    pub fn with_group_provider(mut self, groups: Arc<dyn GroupProvider>) -> Self {
        self.groups = Some(groups);
        self
    }

    /// Whether `item` may propagate for the group, category and direction
    ///
    /// With no whitelist entries everything is allowed; otherwise the item
    /// must match a whitelist pattern. A blacklist match always denies.
    pub fn is_allowed(&self, group: &str, category: &str, item: &str, direction: Direction) -> bool {
        let whitelist = self.collect_list_entries(ListType::Whitelist, group, category, direction);
        let blacklist = self.collect_list_entries(ListType::Blacklist, group, category, direction);

        let whitelisted =
            whitelist.is_empty() || whitelist.iter().any(|pattern| self.matches(item, pattern));
        let allowed = whitelisted && !blacklist.iter().any(|pattern| self.matches(item, pattern));

        log_policy_decision(group, category, item, direction.as_str(), allowed);
        allowed
    }

    /// Entries of a list for a group, unioned with those of its parent chain
    pub fn collect_list_entries(
        &self,
        list_type: ListType,
        group: &str,
        category: &str,
        direction: Direction,
    ) -> IndexSet<String> {
        let mut entries = IndexSet::new();
        let mut visited = HashSet::new();
        let mut current = Some(group.to_string());

        while let Some(name) = current {
            if !visited.insert(name.clone()) {
                warn!(
                    group = %group,
                    cycle_at = %name,
                    "Group parent chain contains a cycle, stopping inheritance walk"
                );
                break;
            }

            if let Some(value) = self.properties.get(&list_key(list_type, &name, category, direction)) {
                entries.extend(parse_list(&value));
            }
            current = self.parent_of(&name);
        }
        entries
    }

    /// Union of a list over several groups
    pub fn list_entries_for_groups<'a, I>(
        &self,
        list_type: ListType,
        groups: I,
        category: &str,
        direction: Direction,
    ) -> IndexSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        groups
            .into_iter()
            .flat_map(|group| self.collect_list_entries(list_type, group, category, direction))
            .collect()
    }

    /// Add `entry` to the group's own list if absent, remove it if present.
    /// Returns whether the entry is in the list afterwards.
    pub fn switch_list_entry(
        &self,
        list_type: ListType,
        group: &str,
        category: &str,
        direction: Direction,
        entry: &str,
    ) -> bool {
        let entry = entry.trim();
        let key = list_key(list_type, group, category, direction);
        let _guard = self.update_lock.lock();

        let mut entries = self
            .properties
            .get(&key)
            .map(|value| parse_list(&value))
            .unwrap_or_default();

        let present = if entries.shift_remove(entry) {
            false
        } else {
            if !entry.is_empty() {
                entries.insert(entry.to_string());
            }
            !entry.is_empty()
        };

        let value = entries.into_iter().collect::<Vec<_>>().join(DELIMITER);
        self.properties.set(&key, value);
        present
    }

    /// Parent group name: the group's own declaration, else `<group>.parent`
    fn parent_of(&self, group: &str) -> Option<String> {
        let declared = self
            .groups
            .as_ref()
            .and_then(|provider| provider.find_group_by_name(group))
            .and_then(|g| g.parent);

        declared
            .or_else(|| self.properties.get(&format!("{group}{SEPARATOR}{PARENT}")))
            .map(|parent| parent.trim().to_string())
            .filter(|parent| !parent.is_empty())
    }

    fn matches(&self, item: &str, pattern: &str) -> bool {
        if let Some(compiled) = self.patterns.get(pattern) {
            return compiled.as_ref().is_some_and(|regex| regex.is_match(item));
        }
        let compiled = compile_pattern(pattern);
        let matched = compiled.as_ref().is_some_and(|regex| regex.is_match(item));
        self.patterns.insert(pattern.to_string(), compiled);
        matched
    }
}

impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("group_provider", &self.groups.is_some())
            .field("cached_patterns", &self.patterns.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Group, InMemoryGroupManager, Node};
    use crate::properties::InMemoryProperties;

    fn policy(values: &[(&str, &str)]) -> AccessPolicy {
        AccessPolicy::new(Arc::new(InMemoryProperties::with_values(values.iter().copied())))
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("foo.bar", "foo.*"));
        assert!(wildcard_match("foo.", "foo.*"));
        assert!(!wildcard_match("bar.foo", "foo.*"));
        assert!(wildcard_match("anything", "*"));
        assert!(!wildcard_match("Foo.bar", "foo.*"));
    }

    #[test]
    fn test_wildcard_treats_dots_literally() {
        assert!(!wildcard_match("fooXbar", "foo.bar"));
        assert!(wildcard_match("a+b(c)", "a+b(*)"));
    }

    #[test]
    fn test_no_lists_allows_everything() {
        let policy = policy(&[]);
        assert!(policy.is_allowed("default", "config", "anything", Direction::Inbound));
    }

    #[test]
    fn test_blacklist_wins_over_whitelist() {
        let policy = policy(&[
            ("g.cat.whitelist.inbound", "a.*"),
            ("g.cat.blacklist.inbound", "a.b"),
        ]);
        assert!(!policy.is_allowed("g", "cat", "a.b", Direction::Inbound));
        assert!(policy.is_allowed("g", "cat", "a.c", Direction::Inbound));
        assert!(!policy.is_allowed("g", "cat", "z", Direction::Inbound));
        // Other direction is unconstrained
        assert!(policy.is_allowed("g", "cat", "z", Direction::Outbound));
    }

    #[test]
    fn test_child_inherits_parent_whitelist() {
        let policy = policy(&[
            ("child.parent", "root"),
            ("root.cat.whitelist.outbound", "x"),
        ]);
        assert!(policy.is_allowed("child", "cat", "x", Direction::Outbound));
        assert!(!policy.is_allowed("child", "cat", "y", Direction::Outbound));
    }

    #[test]
    fn test_entries_union_across_levels() {
        let policy = policy(&[
            ("child.parent", "root"),
            ("child.cat.whitelist.inbound", "a, b\n"),
            ("root.cat.whitelist.inbound", "c,,a"),
        ]);
        let entries = policy.collect_list_entries(ListType::Whitelist, "child", "cat", Direction::Inbound);
        let mut sorted: Vec<_> = entries.into_iter().collect();
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parent_cycle_terminates() {
        let policy = policy(&[
            ("a.parent", "b"),
            ("b.parent", "a"),
            ("a.cat.whitelist.inbound", "x"),
            ("b.cat.whitelist.inbound", "y"),
        ]);
        let entries = policy.collect_list_entries(ListType::Whitelist, "a", "cat", Direction::Inbound);
        assert_eq!(entries.len(), 2);
        assert!(policy.is_allowed("a", "cat", "y", Direction::Inbound));
    }

    #[test]
    fn test_parent_from_group_provider() {
        let manager = Arc::new(InMemoryGroupManager::new(Node::new("n1", "127.0.0.1", 5701)));
        manager.register_group(Group::new("child").with_parent("root"));

        let policy = policy(&[("root.cat.blacklist.inbound", "secret*")])
            .with_group_provider(manager);
        assert!(!policy.is_allowed("child", "cat", "secret.key", Direction::Inbound));
        assert!(policy.is_allowed("child", "cat", "public.key", Direction::Inbound));
    }

    #[test]
    fn test_switch_list_entry_toggles() {
        let properties = Arc::new(InMemoryProperties::with_values([(
            "g.cat.blacklist.outbound",
            "a,b",
        )]));
        let policy = AccessPolicy::new(properties.clone());

        assert!(policy.switch_list_entry(ListType::Blacklist, "g", "cat", Direction::Outbound, "c"));
        assert_eq!(properties.get("g.cat.blacklist.outbound").as_deref(), Some("a,b,c"));

        assert!(!policy.switch_list_entry(ListType::Blacklist, "g", "cat", Direction::Outbound, "a"));
        assert_eq!(properties.get("g.cat.blacklist.outbound").as_deref(), Some("b,c"));

        // Absent list is created
        assert!(policy.switch_list_entry(ListType::Whitelist, "g", "cat", Direction::Inbound, "x"));
        assert_eq!(properties.get("g.cat.whitelist.inbound").as_deref(), Some("x"));
    }

    #[test]
    fn test_list_entries_for_groups() {
        let policy = policy(&[
            ("g1.cat.whitelist.inbound", "a"),
            ("g2.cat.whitelist.inbound", "b,a"),
        ]);
        let entries =
            policy.list_entries_for_groups(ListType::Whitelist, ["g1", "g2"], "cat", Direction::Inbound);
        assert_eq!(entries.len(), 2);
    }
}
