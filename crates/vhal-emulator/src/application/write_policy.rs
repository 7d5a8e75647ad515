//! Runtime-mode dependent write suppression.
//!
//! Some properties must not be written in some runtime modes: in a
//! virtualized guest the display-brightness control has no physical
//! counterpart, and writing it produces a local echo that freezes the
//! downstream display service. A suppressed write is reported as successful
//! to the HAL client without touching the store.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vhal_core::domain::property::ids;

/// Where the emulator is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeMode {
    /// Running directly on a development host.
    #[default]
    Host,
    /// Running inside a virtualized guest with a co-located console.
    VirtualizedGuest,
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeMode::Host => f.write_str("host"),
            RuntimeMode::VirtualizedGuest => f.write_str("virtualized-guest"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown runtime mode '{0}' (expected 'host' or 'virtualized-guest')")]
pub struct ParseRuntimeModeError(String);

impl FromStr for RuntimeMode {
    type Err = ParseRuntimeModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(RuntimeMode::Host),
            "virtualized-guest" => Ok(RuntimeMode::VirtualizedGuest),
            other => Err(ParseRuntimeModeError(other.to_string())),
        }
    }
}

/// Set of properties whose writes are dropped, and the modes in which the
/// drop applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionPolicy {
    properties: HashSet<i32>,
    modes: HashSet<RuntimeMode>,
}

impl SuppressionPolicy {
    pub fn new(
        properties: impl IntoIterator<Item = i32>,
        modes: impl IntoIterator<Item = RuntimeMode>,
    ) -> Self {
        Self {
            properties: properties.into_iter().collect(),
            modes: modes.into_iter().collect(),
        }
    }

    /// A policy that suppresses nothing.
    pub fn none() -> Self {
        Self {
            properties: HashSet::new(),
            modes: HashSet::new(),
        }
    }

    pub fn suppresses(&self, mode: RuntimeMode, prop_id: i32) -> bool {
        self.modes.contains(&mode) && self.properties.contains(&prop_id)
    }
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self::new([ids::DISPLAY_BRIGHTNESS], [RuntimeMode::VirtualizedGuest])
    }
}

/// A suppression policy bound to the mode the process runs in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WritePolicy {
    mode: RuntimeMode,
    suppression: SuppressionPolicy,
}

impl WritePolicy {
    pub fn new(mode: RuntimeMode, suppression: SuppressionPolicy) -> Self {
        Self { mode, suppression }
    }

    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    /// Returns `true` if a HAL client write to `prop_id` must be dropped.
    pub fn suppresses(&self, prop_id: i32) -> bool {
        self.suppression.suppresses(self.mode, prop_id)
    }
}
