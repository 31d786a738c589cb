//! # Handler Registry
//!
//! Dynamic bind/unbind table from event type tag to handler. Entries are
//! whole `Arc`s swapped in a concurrent map, so a dispatch worker reading
//! the table never observes a half-updated entry.

use crate::events::handler::EventHandler;
use crate::events::types::ClusterMessage;
use crate::properties::PropertySource;
use crate::switch::SwitchStatus;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry of event handlers keyed by handled type
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn EventHandler>>,
    /// Source of `handler.<name>` enable toggles
    properties: Option<Arc<dyn PropertySource>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            properties: None,
        }
    }

    /// Create a registry that honours per-handler toggles from configuration
    pub fn with_properties(properties: Arc<dyn PropertySource>) -> Self {
        Self {
            handlers: DashMap::new(),
            properties: Some(properties),
        }
    }

    /// Bind a handler under its handled type, replacing any previous one
    pub fn bind(&self, handler: Arc<dyn EventHandler>) {
        let event_type = handler.handled_type().to_string();
        if event_type.is_empty() {
            warn!(handler = handler.name(), "Refusing to bind handler without a type tag");
            return;
        }

        if let Some(previous) = self.handlers.insert(event_type.clone(), handler.clone()) {
            warn!(
                event_type = %event_type,
                previous = previous.name(),
                "Replacing existing handler"
            );
        }
        info!(event_type = %event_type, handler = handler.name(), "Bound event handler");
    }

    /// Unbind a handler. Only removes the entry if it still points at this
    /// handler, so unbinding a replaced handler leaves its successor bound.
    pub fn unbind(&self, handler: &Arc<dyn EventHandler>) -> bool {
        let removed = self
            .handlers
            .remove_if(handler.handled_type(), |_, bound| Arc::ptr_eq(bound, handler))
            .is_some();

        if removed {
            info!(event_type = handler.handled_type(), handler = handler.name(), "Unbound event handler");
        } else {
            warn!(
                event_type = handler.handled_type(),
                handler = handler.name(),
                "Attempted to unbind a handler that is not bound"
            );
        }
        removed
    }

    /// Find the enabled handler for a message
    ///
    /// Handlers whose switch is off, or which are disabled through
    /// configuration, are reported as not found.
    pub fn lookup(&self, message: &ClusterMessage) -> Option<Arc<dyn EventHandler>> {
        self.lookup_type(message.event_type())
    }

    pub fn lookup_type(&self, event_type: &str) -> Option<Arc<dyn EventHandler>> {
        let handler = self.handlers.get(event_type)?.value().clone();

        if !handler.switch().is_on() {
            debug!(event_type, handler = handler.name(), "Handler switched off");
            return None;
        }
        if let Some(properties) = &self.properties {
            if !properties.handler_enabled(handler.name()) {
                debug!(event_type, handler = handler.name(), "Handler disabled by configuration");
                return None;
            }
        }
        Some(handler)
    }

    /// Check if a handler is bound for the type, regardless of its switch
    pub fn has_handler(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Every bound handler
    pub fn handlers(&self) -> Vec<Arc<dyn EventHandler>> {
        self.handlers.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Find a bound handler by name
    pub fn find_by_name(&self, name: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers
            .iter()
            .find(|entry| entry.value().name() == name)
            .map(|entry| entry.value().clone())
    }

    /// Bound handler names with their effective status
    pub fn statuses(&self) -> BTreeMap<String, SwitchStatus> {
        self.handlers
            .iter()
            .map(|entry| {
                let handler = entry.value();
                let enabled = handler.switch().is_on()
                    && self
                        .properties
                        .as_ref()
                        .map_or(true, |p| p.handler_enabled(handler.name()));
                (handler.name().to_string(), SwitchStatus::from(enabled))
            })
            .collect()
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.handlers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
