//! # Switches
//!
//! On/off toggles owned by handlers, producers and consumers. Status is held
//! in an atomic so a switch can be flipped from a control command while
//! dispatch workers are reading it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Switch position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchStatus {
    On,
    Off,
}

impl SwitchStatus {
    pub fn as_bool(self) -> bool {
        matches!(self, SwitchStatus::On)
    }

    /// Parse `on`/`off`/`true`/`false` (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "on" | "true" => Some(SwitchStatus::On),
            "off" | "false" => Some(SwitchStatus::Off),
            _ => None,
        }
    }
}

impl From<bool> for SwitchStatus {
    fn from(value: bool) -> Self {
        if value {
            SwitchStatus::On
        } else {
            SwitchStatus::Off
        }
    }
}

impl fmt::Display for SwitchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchStatus::On => write!(f, "ON"),
            SwitchStatus::Off => write!(f, "OFF"),
        }
    }
}

/// Named on/off switch
#[derive(Debug)]
pub struct Switch {
    name: String,
    on: AtomicBool,
}

impl Switch {
    /// Create a switch that starts ON
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_status(name, SwitchStatus::On)
    }

    pub fn with_status(name: impl Into<String>, status: SwitchStatus) -> Self {
        Self {
            name: name.into(),
            on: AtomicBool::new(status.as_bool()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn turn_on(&self) {
        self.on.store(true, Ordering::Release);
    }

    pub fn turn_off(&self) {
        self.on.store(false, Ordering::Release);
    }

    pub fn set(&self, status: SwitchStatus) {
        self.on.store(status.as_bool(), Ordering::Release);
    }

    pub fn status(&self) -> SwitchStatus {
        SwitchStatus::from(self.on.load(Ordering::Acquire))
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }
}
