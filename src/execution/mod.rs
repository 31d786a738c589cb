//! # Command Execution
//!
//! Cluster-wide commands with per-command timeout aggregation: the
//! [`ExecutionContext`] registers a command in the [`PendingCommandStore`],
//! arms an [`ExpiryReaper`], publishes it, and waits for the
//! [`ResultHandler`] to correlate enough results.

pub mod command;
pub mod context;
pub mod handler;
pub mod reaper;
pub mod store;

pub use command::{Command, CommandResult, CommandResults, PendingCommand};
pub use context::{CommandOutcome, ExecutionContext};
pub use handler::{CommandHandler, CommandHandlerAdapter, ResultHandler};
pub use reaper::ExpiryReaper;
pub use store::PendingCommandStore;
