//! Power domain types
//!
//! Provides validated types for power limits and constraints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Power limit in milliwatts (stored internally) but displayed as watts
///
/// Milliwatts is the unit NVML uses on both reads and writes; watts only
/// appear at the user-facing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PowerLimit(u32);

impl PowerLimit {
    /// Create a new power limit from watts
    pub const fn from_watts(watts: u32) -> Self {
        Self(watts.saturating_mul(1000))
    }

    /// Create a new power limit from milliwatts
    pub const fn from_milliwatts(mw: u32) -> Self {
        Self(mw)
    }

    /// Get the power limit in watts
    #[inline]
    pub const fn as_watts(&self) -> u32 {
        self.0 / 1000
    }

    /// Get the power limit in milliwatts
    #[inline]
    pub const fn as_milliwatts(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PowerLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}W", self.as_watts())
    }
}

/// Power constraints from GPU (min/max limits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerConstraints {
    /// Minimum power limit
    pub min: PowerLimit,
    /// Maximum power limit
    pub max: PowerLimit,
}

impl PowerConstraints {
    /// Create new power constraints
    pub fn new(min: PowerLimit, max: PowerLimit) -> Self {
        Self { min, max }
    }
}

impl fmt::Display for PowerConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}
