//! # Error Types
//!
//! Crate-wide error enum. Wiring failures (no store, no transport, bad
//! configuration) surface to callers; steady-state conditions such as a
//! missing handler or silent remote nodes are logged and degrade to partial
//! results instead.

/// Errors raised by the coordination core
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    /// No pending-command store has been bound to the execution context
    #[error("Command store not found")]
    StoreUnavailable,

    /// No transport/producer has been bound to the execution context
    #[error("Command producer not found")]
    TransportUnavailable,

    /// No handler was found for an event within the dispatch window
    #[error("No handler found for event type '{event_type}' within the dispatch timeout")]
    DispatchTimeout { event_type: String },

    /// Not every destination node answered before the command timed out
    #[error("Command '{command_id}' timed out with {received}/{expected} results")]
    CommandTimeout {
        command_id: String,
        received: usize,
        expected: usize,
    },

    /// The transport refused or failed to publish a message
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A handler failed while processing an event
    #[error("Handler '{handler}' failed: {reason}")]
    Handler { handler: String, reason: String },

    /// A command failed validation before submission
    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    /// An operation needing a Tokio runtime was called outside of one
    #[error("No Tokio runtime available: {0}")]
    RuntimeUnavailable(String),
}

impl MeshError {
    /// True for wiring errors that must be fixed by the caller's setup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MeshError::StoreUnavailable
                | MeshError::TransportUnavailable
                | MeshError::Configuration(_)
                | MeshError::RuntimeUnavailable(_)
        )
    }
}

impl From<config::ConfigError> for MeshError {
    fn from(err: config::ConfigError) -> Self {
        MeshError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for MeshError {
    fn from(err: serde_json::Error) -> Self {
        MeshError::Transport(format!("serialization failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wiring_errors_are_fatal() {
        assert!(MeshError::StoreUnavailable.is_fatal());
        assert!(MeshError::TransportUnavailable.is_fatal());
        assert!(!MeshError::DispatchTimeout {
            event_type: "x".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = MeshError::CommandTimeout {
            command_id: "cmd-1".to_string(),
            received: 1,
            expected: 3,
        };
        assert_eq!(
            err.to_string(),
            "Command 'cmd-1' timed out with 1/3 results"
        );
        assert_eq!(
            MeshError::StoreUnavailable.to_string(),
            "Command store not found"
        );
    }
}
