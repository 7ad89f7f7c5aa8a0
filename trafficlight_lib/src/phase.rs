//! The two-phase signal state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The phase shown by the light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Traffic must stop. Every light starts here.
    #[default]
    Red,
    /// Traffic may proceed.
    Green,
}

impl Phase {
    /// Returns the opposite phase.
    pub fn toggled(self) -> Self {
        match self {
            Phase::Red => Phase::Green,
            Phase::Green => Phase::Red,
        }
    }

    /// Whether this is [`Phase::Green`].
    pub fn is_green(self) -> bool {
        self == Phase::Green
    }

    /// Whether this is [`Phase::Red`].
    pub fn is_red(self) -> bool {
        self == Phase::Red
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Phase::Red => 0,
            Phase::Green => 1,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Phase::Red,
            _ => Phase::Green,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Red => f.write_str("red"),
            Phase::Green => f.write_str("green"),
        }
    }
}
