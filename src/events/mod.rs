//! # Event System
//!
//! Message envelope, handler capability, handler registry, asynchronous
//! dispatcher, and the producer/consumer pair wrapping a pluggable
//! transport.
//!
//! ```text
//! transport ──► EventConsumer ──► EventDispatcher ──► HandlerRegistry ──► EventHandler
//!     ▲                                                                      │
//!     └──────────────────────────── EventProducer ◄──────────────────────────┘
//! ```

pub mod consumer;
pub mod dispatcher;
pub mod handler;
pub mod producer;
pub mod registry;
pub mod transport;
pub mod types;

pub use consumer::EventConsumer;
pub use dispatcher::{DispatchStats, EventDispatcher};
pub use handler::EventHandler;
pub use producer::EventProducer;
pub use registry::HandlerRegistry;
pub use transport::{LocalBus, Transport};
pub use types::{ClusterMessage, Direction, Event};
