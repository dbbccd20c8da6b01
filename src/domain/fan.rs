//! Fan-related domain types
//!
//! Provides validated types for fan speed, curves, and policies.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fan speed percentage (0-100)
///
/// Validated on construction to ensure the value is within valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FanSpeed(u8);

impl FanSpeed {
    /// Minimum valid fan speed
    pub const MIN: u8 = 0;
    /// Maximum valid fan speed
    pub const MAX: u8 = 100;

    /// Create a new FanSpeed with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidFanSpeed` if value > 100
    pub fn new(value: u8) -> Result<Self, DomainError> {
        if value > Self::MAX {
            return Err(DomainError::InvalidFanSpeed(value.into()));
        }
        Ok(Self(value))
    }

    /// Create a FanSpeed from a signed user-supplied percentage
    ///
    /// # Errors
    /// Returns `DomainError::InvalidFanSpeed` if value is outside 0-100
    pub fn from_percent(value: i64) -> Result<Self, DomainError> {
        u8::try_from(value)
            .map_err(|_| DomainError::InvalidFanSpeed(value))
            .and_then(Self::new)
    }

    /// Create a FanSpeed from a raw driver reading, clamping to 100
    ///
    /// NVML occasionally reports values above 100 on some boards.
    pub fn saturating(value: u32) -> Self {
        Self(value.min(Self::MAX as u32) as u8)
    }

    /// Get the speed as a percentage value (0-100)
    #[inline]
    pub const fn as_percentage(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl TryFrom<u8> for FanSpeed {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FanSpeed> for u8 {
    fn from(speed: FanSpeed) -> Self {
        speed.0
    }
}

impl From<FanSpeed> for u32 {
    fn from(speed: FanSpeed) -> Self {
        speed.0 as u32
    }
}

/// A single point on a fan curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanCurvePoint {
    /// Temperature threshold in Celsius
    pub temperature: i32,
    /// Target fan speed at or above this temperature
    pub speed: FanSpeed,
}

impl FanCurvePoint {
    /// Create a new fan curve point
    pub fn new(temperature: i32, speed: FanSpeed) -> Self {
        Self { temperature, speed }
    }

    /// Parse a `TEMP:SPEED` pair such as `60:50`
    ///
    /// # Errors
    /// Returns `DomainError::InvalidFanCurve` for malformed pairs and
    /// `DomainError::InvalidFanSpeed` for speeds outside 0-100.
    pub fn parse(pair: &str) -> Result<Self, DomainError> {
        let (temp, speed) = pair.trim().split_once(':').ok_or_else(|| {
            DomainError::InvalidFanCurve(format!(
                "Invalid speed pair format: '{}'. Expected TEMP:SPEED (e.g., 60:50)",
                pair
            ))
        })?;

        let temperature: i32 = temp.trim().parse().map_err(|_| {
            DomainError::InvalidFanCurve(format!(
                "Invalid temperature in '{}': not a number",
                pair
            ))
        })?;

        let speed: i64 = speed.trim().parse().map_err(|_| {
            DomainError::InvalidFanCurve(format!("Invalid speed in '{}': not a number", pair))
        })?;

        Ok(Self::new(temperature, FanSpeed::from_percent(speed)?))
    }
}

/// A fan curve defining speed based on temperature
///
/// Points are kept sorted by temperature in descending order with no two
/// points at the same temperature. Lookup is a discrete step: the first
/// point whose threshold is at or below the current temperature wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanCurve {
    points: Vec<FanCurvePoint>,
    /// Speed used when no point matches
    default_speed: FanSpeed,
}

impl FanCurve {
    /// Create a new fan curve from points in any order
    ///
    /// An empty point list is valid and always yields the default speed.
    ///
    /// # Errors
    /// Returns `DomainError::DuplicateCurveTemperature` if two points share
    /// a temperature threshold
    pub fn new(
        mut points: Vec<FanCurvePoint>,
        default_speed: FanSpeed,
    ) -> Result<Self, DomainError> {
        points.sort_by(|a, b| b.temperature.cmp(&a.temperature));

        if let Some(pair) = points
            .windows(2)
            .find(|w| w[0].temperature == w[1].temperature)
        {
            return Err(DomainError::DuplicateCurveTemperature(pair[0].temperature));
        }

        Ok(Self {
            points,
            default_speed,
        })
    }

    /// Get the target fan speed for a given temperature
    pub fn speed_for_temperature(&self, temp: i32) -> FanSpeed {
        self.points
            .iter()
            .find(|p| p.temperature <= temp)
            .map(|p| p.speed)
            .unwrap_or(self.default_speed)
    }

    /// Get the curve points, hottest first
    pub fn points(&self) -> &[FanCurvePoint] {
        &self.points
    }

    /// Get the default speed
    pub fn default_speed(&self) -> FanSpeed {
        self.default_speed
    }
}

impl fmt::Display for FanCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for point in &self.points {
            write!(f, "{}°C→{} ", point.temperature, point.speed)?;
        }
        write!(f, "(default {})", self.default_speed)
    }
}

/// Fan control policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FanPolicy {
    /// GPU controls fan speed automatically
    #[default]
    Auto,
    /// Manual fan speed control
    Manual,
}

impl fmt::Display for FanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanPolicy::Auto => write!(f, "Auto"),
            FanPolicy::Manual => write!(f, "Manual"),
        }
    }
}

/// Fan speed range the driver reports as settable
///
/// Some drivers do not respect the minimum and stop the motor at a
/// different speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanConstraints {
    pub min: FanSpeed,
    pub max: FanSpeed,
}

impl FanConstraints {
    /// Create new fan constraints
    pub fn new(min: FanSpeed, max: FanSpeed) -> Self {
        Self { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speed(value: u8) -> FanSpeed {
        FanSpeed::new(value).unwrap()
    }

    fn curve(points: &[(i32, u8)], default: u8) -> FanCurve {
        let points = points
            .iter()
            .map(|&(t, s)| FanCurvePoint::new(t, speed(s)))
            .collect();
        FanCurve::new(points, speed(default)).unwrap()
    }

    #[test]
    fn test_fan_speed_valid() {
        assert!(FanSpeed::new(0).is_ok());
        assert!(FanSpeed::new(50).is_ok());
        assert!(FanSpeed::new(100).is_ok());
    }

    #[test]
    fn test_fan_speed_invalid() {
        assert!(FanSpeed::new(101).is_err());
        assert!(FanSpeed::new(255).is_err());
        assert_eq!(
            FanSpeed::from_percent(-1),
            Err(DomainError::InvalidFanSpeed(-1))
        );
        assert_eq!(
            FanSpeed::from_percent(300),
            Err(DomainError::InvalidFanSpeed(300))
        );
    }

    #[test]
    fn test_fan_speed_saturating() {
        assert_eq!(FanSpeed::saturating(40).as_percentage(), 40);
        assert_eq!(FanSpeed::saturating(140).as_percentage(), 100);
    }

    #[test]
    fn test_fan_speed_display() {
        assert_eq!(speed(75).to_string(), "75%");
    }

    #[test]
    fn test_fan_curve_sorted_descending() {
        let c = curve(&[(10, 30), (40, 100), (0, 0), (35, 75), (20, 50)], 50);
        let temps: Vec<_> = c.points().iter().map(|p| p.temperature).collect();
        assert_eq!(temps, vec![40, 35, 20, 10, 0]);
    }

    #[test]
    fn test_fan_curve_rejects_duplicate_temperature() {
        let points = vec![
            FanCurvePoint::new(60, speed(50)),
            FanCurvePoint::new(60, speed(70)),
        ];
        assert_eq!(
            FanCurve::new(points, speed(30)),
            Err(DomainError::DuplicateCurveTemperature(60))
        );
    }

    #[test]
    fn test_fan_curve_lookup_first_match() {
        let c = curve(&[(40, 100), (30, 50), (20, 35), (0, 0)], 60);

        assert_eq!(c.speed_for_temperature(25).as_percentage(), 35);
        assert_eq!(c.speed_for_temperature(5).as_percentage(), 0);
        assert_eq!(c.speed_for_temperature(-5).as_percentage(), 60);
        assert_eq!(c.speed_for_temperature(30).as_percentage(), 50);
        assert_eq!(c.speed_for_temperature(95).as_percentage(), 100);
    }

    #[test]
    fn test_fan_curve_lookup_matches_linear_scan() {
        let c = curve(&[(80, 100), (65, 70), (50, 45), (35, 30)], 20);

        for temp in -20..=120 {
            let expected = c
                .points()
                .iter()
                .find(|p| p.temperature <= temp)
                .map(|p| p.speed)
                .unwrap_or(c.default_speed());
            assert_eq!(c.speed_for_temperature(temp), expected, "temp {}", temp);
        }
    }

    #[test]
    fn test_empty_curve_uses_default() {
        let c = curve(&[], 45);
        assert_eq!(c.speed_for_temperature(90).as_percentage(), 45);
        assert_eq!(c.speed_for_temperature(-40).as_percentage(), 45);
    }

    #[test]
    fn test_parse_pair() {
        let point = FanCurvePoint::parse("60:50").unwrap();
        assert_eq!(point.temperature, 60);
        assert_eq!(point.speed.as_percentage(), 50);

        assert!(matches!(
            FanCurvePoint::parse("10-20"),
            Err(DomainError::InvalidFanCurve(_))
        ));
        assert!(matches!(
            FanCurvePoint::parse(""),
            Err(DomainError::InvalidFanCurve(_))
        ));
        assert!(matches!(
            FanCurvePoint::parse("10-20:10-20"),
            Err(DomainError::InvalidFanCurve(_))
        ));
        assert!(matches!(
            FanCurvePoint::parse("60:150"),
            Err(DomainError::InvalidFanSpeed(150))
        ));
    }

    #[test]
    fn test_fan_policy_display() {
        assert_eq!(FanPolicy::Auto.to_string(), "Auto");
        assert_eq!(FanPolicy::Manual.to_string(), "Manual");
    }
}
