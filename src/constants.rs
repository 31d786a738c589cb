//! # System Constants
//!
//! Configuration key fragments and defaults shared across the core.

/// Separator between the parts of a configuration property name
pub const SEPARATOR: &str = ".";

/// Delimiter between items of a configured list
pub const DELIMITER: &str = ",";

/// Name of the group every node joins when it belongs to no other group
pub const DEFAULT_GROUP_NAME: &str = "default";

/// Property suffix naming a group's parent (`<group>.parent`)
pub const PARENT: &str = "parent";

/// Prefix of per-handler enable toggles (`handler.<name>`)
pub const HANDLER: &str = "handler";

/// Property fragment of the synchronization toggle (`<group>.<category>.sync`)
pub const SYNC: &str = "sync";

pub mod lists {
    pub const WHITELIST: &str = "whitelist";
    pub const BLACKLIST: &str = "blacklist";
}

pub mod defaults {
    /// Interval between handler lookups while dispatching
    pub const DISPATCH_INTERVAL_MS: u64 = 1_000;

    /// Window during which a missing handler is retried
    pub const DISPATCH_TIMEOUT_MS: u64 = 10_000;

    /// Command timeout when the caller does not set one
    pub const COMMAND_TIMEOUT_MS: u64 = 10_000;

    /// Capacity of the in-process bus channel
    pub const CHANNEL_CAPACITY: usize = 1_024;

    pub const NODE_HOST: &str = "127.0.0.1";
    pub const NODE_PORT: u16 = 5701;
}

/// Type tags of the built-in control commands and their results
pub mod control {
    pub const PRODUCER_SWITCH_COMMAND: &str = "producer-switch";
    pub const PRODUCER_SWITCH_RESULT: &str = "producer-switch-result";
    pub const CONSUMER_SWITCH_COMMAND: &str = "consumer-switch";
    pub const CONSUMER_SWITCH_RESULT: &str = "consumer-switch-result";
    pub const MANAGE_HANDLERS_COMMAND: &str = "manage-handlers";
    pub const MANAGE_HANDLERS_RESULT: &str = "manage-handlers-result";
}

/// Marker wrapping a comma-separated list that must be union-merged
pub const MERGABLE_PREFIX: &str = "MERGABLE[";
pub const MERGABLE_SUFFIX: &str = "]";
