//! Thermal domain types
//!
//! Provides types for temperature and acoustic thresholds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Temperature in degrees Celsius
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Temperature(i32);

impl Temperature {
    /// Create a new Temperature
    pub const fn new(celsius: i32) -> Self {
        Self(celsius)
    }

    /// Get the temperature in Celsius
    #[inline]
    pub const fn as_celsius(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°C", self.0)
    }
}

impl From<i32> for Temperature {
    fn from(value: i32) -> Self {
        Self::new(value)
    }
}

impl From<u32> for Temperature {
    fn from(value: u32) -> Self {
        Self::new(value as i32)
    }
}

impl From<Temperature> for i32 {
    fn from(temp: Temperature) -> Self {
        temp.0
    }
}

/// Acoustic temperature threshold and its allowed range
///
/// The acoustic limit tells the GPU to throttle to maintain a target temperature.
/// This is the same setting used by GeForce Experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcousticLimits {
    /// Current acoustic temperature limit
    pub current: Temperature,
    /// Minimum allowed acoustic limit
    pub min: Temperature,
    /// Maximum allowed acoustic limit
    pub max: Temperature,
}

impl AcousticLimits {
    /// Create new acoustic limits
    pub fn new(current: Temperature, min: Temperature, max: Temperature) -> Self {
        Self { current, min, max }
    }
}
