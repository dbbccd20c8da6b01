//! Configuration system
//!
//! Handles TOML config file parsing and CLI argument merging.

pub mod builder;
pub mod file;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use crate::domain::policy::{DEFAULT_LOOP_INTERVAL_SECS, DEFAULT_RETRY_INTERVAL_SECS};
use crate::domain::{DeviceSelector, FanCurve, FanCurvePoint, FanSpeed, Policy};
use crate::error::{ConfigError, DomainError};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// GPU selection settings
    pub gpu: GpuConfig,
    /// Fan control settings; the fan domain is inactive without them
    pub fan: Option<FanConfig>,
    /// Power control settings
    pub power: PowerConfig,
    /// Thermal settings
    pub thermal: ThermalConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Dry run mode
    pub dry_run: bool,
    /// Control loop interval in seconds
    pub interval_seconds: f64,
    /// Enable retry on errors
    pub retry: bool,
    /// Retry interval in seconds
    pub retry_interval_seconds: f64,
    /// Retry after permission errors
    pub retry_permission_denied: bool,
    /// Stop retrying after this many restarts
    pub max_attempts: Option<u32>,
    /// Run a single tick and exit
    pub single_use: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            interval_seconds: DEFAULT_LOOP_INTERVAL_SECS,
            retry: true,
            retry_interval_seconds: DEFAULT_RETRY_INTERVAL_SECS,
            retry_permission_denied: true,
            max_attempts: None,
            single_use: false,
        }
    }
}

/// GPU selection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct GpuConfig {
    /// Target GPU by index
    pub index: Option<u32>,
    /// Target GPU by exact name
    pub name: Option<String>,
    /// Target GPU by UUID
    pub uuid: Option<String>,
}

impl GpuConfig {
    /// The selector these settings describe, UUID taking precedence
    pub fn selector(&self) -> Option<DeviceSelector> {
        DeviceSelector::from_parts(self.uuid.clone(), self.name.clone(), self.index)
    }

    pub fn is_empty(&self) -> bool {
        self.selector().is_none()
    }
}

/// Default fan speed percentage when no curve point matches
pub const DEFAULT_FAN_SPEED: u8 = 50;

/// Fan control configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FanConfig {
    /// Default fan speed percentage
    pub default_speed: u8,
    /// Fan curve points, in any order
    pub curve: Vec<FanCurvePointConfig>,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            default_speed: DEFAULT_FAN_SPEED,
            curve: Vec::new(),
        }
    }
}

impl FanConfig {
    /// Convert to a FanCurve domain object
    pub fn to_fan_curve(&self) -> Result<FanCurve, DomainError> {
        let default_speed = FanSpeed::new(self.default_speed)?;

        let points: Result<Vec<_>, _> = self
            .curve
            .iter()
            .map(|p| {
                let speed = FanSpeed::new(p.speed)?;
                Ok(FanCurvePoint::new(p.temperature, speed))
            })
            .collect();

        FanCurve::new(points?, default_speed)
    }
}

/// Fan curve point configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FanCurvePointConfig {
    /// Temperature threshold in Celsius
    pub temperature: i32,
    /// Fan speed percentage at this temperature
    pub speed: u8,
}

impl From<FanCurvePoint> for FanCurvePointConfig {
    fn from(point: FanCurvePoint) -> Self {
        Self {
            temperature: point.temperature,
            speed: point.speed.as_percentage(),
        }
    }
}

/// Power control configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PowerConfig {
    /// Power limit in watts
    pub limit_watts: Option<u32>,
}

/// Thermal configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ThermalConfig {
    /// Acoustic limit in Celsius
    pub acoustic_limit_celsius: Option<i32>,
}

impl Config {
    /// Build the control policy for `device`
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` when the fan settings do not form
    /// a valid curve, and the policy's own validation errors otherwise.
    pub fn to_policy(&self, device: DeviceSelector) -> Result<Policy, crate::error::AppError> {
        let general = &self.general;
        let mut builder = Policy::builder(device)
            .power_limit_watts(self.power.limit_watts.unwrap_or(0))
            .acoustic_limit_celsius(self.thermal.acoustic_limit_celsius.unwrap_or(0))
            .loop_interval_secs(general.interval_seconds)
            .retry_interval_secs(general.retry_interval_seconds)
            .retry(general.retry)
            .retry_permission_denied(general.retry_permission_denied)
            .max_attempts(general.max_attempts)
            .dry_run(general.dry_run)
            .single_use(general.single_use);

        if let Some(fan) = &self.fan {
            let curve = fan.to_fan_curve().map_err(|e| ConfigError::InvalidValue {
                key: "fan".to_string(),
                message: e.to_string(),
            })?;
            builder = builder.fan_curve(curve);
        }

        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PowerLimit, Temperature};
    use crate::error::AppError;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.interval_seconds, 1.0);
        assert_eq!(config.general.retry_interval_seconds, 2.0);
        assert!(config.general.retry);
        assert!(config.fan.is_none());
        assert!(config.gpu.is_empty());
    }

    #[test]
    fn test_fan_config_to_curve() {
        let config = FanConfig {
            default_speed: 40,
            curve: vec![
                FanCurvePointConfig {
                    temperature: 60,
                    speed: 70,
                },
                FanCurvePointConfig {
                    temperature: 80,
                    speed: 100,
                },
            ],
        };
        let curve = config.to_fan_curve().unwrap();
        assert_eq!(curve.points().len(), 2);
        assert_eq!(curve.points()[0].temperature, 80);
        assert_eq!(curve.default_speed().as_percentage(), 40);
    }

    #[test]
    fn test_to_policy() {
        let config = Config {
            power: PowerConfig {
                limit_watts: Some(275),
            },
            thermal: ThermalConfig {
                acoustic_limit_celsius: Some(78),
            },
            ..Config::default()
        };

        let policy = config.to_policy(DeviceSelector::Index(0)).unwrap();
        assert_eq!(policy.power(), Some(PowerLimit::from_watts(275)));
        assert_eq!(policy.thermal(), Some(Temperature::new(78)));
        assert!(policy.fan().is_none());
        assert_eq!(policy.loop_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_to_policy_requires_a_domain() {
        let result = Config::default().to_policy(DeviceSelector::Index(0));
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::NoActiveDomain))
        ));
    }

    #[test]
    fn test_invalid_fan_speed_is_config_error() {
        let config = Config {
            fan: Some(FanConfig {
                default_speed: 150,
                curve: Vec::new(),
            }),
            ..Config::default()
        };
        let result = config.to_policy(DeviceSelector::Index(0));
        assert!(matches!(
            result,
            Err(AppError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_gpu_selector_precedence() {
        let gpu = GpuConfig {
            index: Some(1),
            name: Some("RTX 4090".to_string()),
            uuid: None,
        };
        assert_eq!(
            gpu.selector(),
            Some(DeviceSelector::Name("RTX 4090".to_string()))
        );
    }
}
