#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Meshsync Core
//!
//! Coordination core of a cluster membership and state-synchronization
//! layer.
//!
//! ## Overview
//!
//! Nodes in a group exchange asynchronous events over a pluggable pub/sub
//! transport, issue cluster-wide commands that collect responses from
//! several nodes within a bounded time, and reconcile replicated state
//! after concurrent updates or network partitions.
//!
//! ## Module Organization
//!
//! - [`execution`] - Command/result correlation with timeout aggregation
//! - [`events`] - Event model, handler registry and asynchronous dispatch
//! - [`policy`] - Whitelist/blacklist filter with group inheritance
//! - [`merge`] - Reconciliation of replicated values
//! - [`control`] - Built-in producer, consumer and handler management commands
//! - [`sync`] - Synchronizer contract and runner
//! - [`bootstrap`] - Wiring of a complete node
//! - [`cluster`] - Nodes, groups and the membership provider
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshsync::cluster::Node;
//! use meshsync::config::CommandConfig;
//! use meshsync::events::{EventProducer, LocalBus};
//! use meshsync::execution::{Command, ExecutionContext, PendingCommandStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), meshsync::MeshError> {
//! let bus = LocalBus::default();
//! let local = Node::new("node-1", "10.0.0.1", 5701);
//! let producer = Arc::new(EventProducer::new(Arc::new(bus), local));
//! let store = Arc::new(PendingCommandStore::new());
//!
//! let context = ExecutionContext::bound(CommandConfig::default(), store, producer);
//! let results = context
//!     .execute(Command::new("producer-switch").with_timeout_ms(2_000))
//!     .await?;
//! println!("{} nodes answered", results.len());
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod control;
pub mod error;
pub mod events;
pub mod execution;
pub mod logging;
pub mod merge;
pub mod policy;
pub mod properties;
pub mod switch;
pub mod sync;

pub use bootstrap::{MeshNode, NodeStatus};
pub use cluster::{Group, GroupProvider, InMemoryGroupManager, MultiNode, Node};
pub use config::{ConfigManager, MeshConfig};
pub use error::{MeshError, Result};
pub use events::{
    ClusterMessage, Direction, Event, EventConsumer, EventDispatcher, EventHandler,
    EventProducer, HandlerRegistry, LocalBus, Transport,
};
pub use execution::{
    Command, CommandHandler, CommandOutcome, CommandResult, CommandResults, ExecutionContext,
    ExpiryReaper, PendingCommandStore, ResultHandler,
};
pub use merge::{MergeResolver, ReplicatedValue};
pub use policy::{AccessPolicy, ListType};
pub use properties::{InMemoryProperties, PropertySource};
pub use switch::{Switch, SwitchStatus};
pub use sync::{SyncRunner, Synchronizer};
