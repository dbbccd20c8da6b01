//! GPU identity domain types
//!
//! Provides `GpuInfo` for discovery output and `DeviceSelector` for
//! choosing which GPU a policy targets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// GPU information and identification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuInfo {
    /// GPU index (0-based)
    pub index: u32,
    /// GPU name (e.g., "NVIDIA GeForce RTX 4090")
    pub name: String,
    /// Unique GPU UUID
    pub uuid: String,
    /// Number of fan controllers
    pub fan_count: u32,
}

impl GpuInfo {
    /// Create new GPU info
    pub fn new(index: u32, name: String, uuid: String) -> Self {
        Self {
            index,
            name,
            uuid,
            fan_count: 0,
        }
    }

    /// Set the fan count
    pub fn with_fan_count(mut self, count: u32) -> Self {
        self.fan_count = count;
        self
    }
}

/// How a policy identifies its target GPU
///
/// The name is matched exactly against what the driver reports, so two
/// boards of the same model can only be told apart by UUID or index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSelector {
    Uuid(String),
    Name(String),
    Index(u32),
}

impl DeviceSelector {
    /// Pick a selector from optional parts, UUID first, then name, then index
    pub fn from_parts(
        uuid: Option<String>,
        name: Option<String>,
        index: Option<u32>,
    ) -> Option<Self> {
        uuid.filter(|u| !u.is_empty())
            .map(Self::Uuid)
            .or_else(|| name.filter(|n| !n.is_empty()).map(Self::Name))
            .or_else(|| index.map(Self::Index))
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Uuid(uuid) => write!(f, "{}", uuid),
            DeviceSelector::Name(name) => write!(f, "'{}'", name),
            DeviceSelector::Index(index) => write!(f, "GPU {}", index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_prefers_uuid() {
        let selector = DeviceSelector::from_parts(
            Some("GPU-1234".to_string()),
            Some("RTX 4080".to_string()),
            Some(0),
        );
        assert_eq!(selector, Some(DeviceSelector::Uuid("GPU-1234".to_string())));
    }

    #[test]
    fn test_selector_falls_back_to_name_then_index() {
        let selector =
            DeviceSelector::from_parts(Some(String::new()), Some("RTX 4080".to_string()), Some(1));
        assert_eq!(selector, Some(DeviceSelector::Name("RTX 4080".to_string())));

        let selector = DeviceSelector::from_parts(None, None, Some(1));
        assert_eq!(selector, Some(DeviceSelector::Index(1)));

        assert_eq!(DeviceSelector::from_parts(None, None, None), None);
    }

    #[test]
    fn test_selector_display() {
        assert_eq!(DeviceSelector::Index(2).to_string(), "GPU 2");
        assert_eq!(
            DeviceSelector::Name("RTX 3080".to_string()).to_string(),
            "'RTX 3080'"
        );
    }
}
