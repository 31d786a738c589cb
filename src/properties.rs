//! # Property Source
//!
//! Key/value configuration store consulted by the access policy (list
//! properties, group parents) and by the handler registry (per-handler
//! enable toggles). The backing store is external; [`InMemoryProperties`]
//! covers embedding and tests.

use crate::constants::{HANDLER, SEPARATOR};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Read/write access to flat string properties
pub trait PropertySource: Send + Sync {
    /// Get a property value
    fn get(&self, key: &str) -> Option<String>;

    /// Set a property value
    fn set(&self, key: &str, value: String);

    /// Remove a property, returning its previous value
    fn remove(&self, key: &str) -> Option<String>;

    /// Whether the handler with the given name is enabled (default: enabled)
    fn handler_enabled(&self, handler_name: &str) -> bool {
        self.get(&handler_key(handler_name))
            .map(|v| !v.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true)
    }

    /// Persist a handler enable toggle
    fn set_handler_enabled(&self, handler_name: &str, enabled: bool) {
        self.set(&handler_key(handler_name), enabled.to_string());
    }
}

/// Property name of a handler toggle
pub fn handler_key(handler_name: &str) -> String {
    format!("{HANDLER}{SEPARATOR}{handler_name}")
}

/// Thread-safe in-memory property store
#[derive(Debug, Default)]
pub struct InMemoryProperties {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-seeded with the given properties
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Snapshot of every property
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values.read().clone()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl PropertySource for InMemoryProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.values.write().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) -> Option<String> {
        self.values.write().remove(key)
    }
}
