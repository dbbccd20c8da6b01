//! Per-tick control decisions
//!
//! A decision is produced for every active domain on every tick, consumed
//! immediately, and then discarded.

use serde::Serialize;
use std::fmt;
use std::time::SystemTime;

/// Which controllable aspect of the device a decision concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlDomain {
    Fan,
    Power,
    Temperature,
}

impl fmt::Display for ControlDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlDomain::Fan => write!(f, "fan"),
            ControlDomain::Power => write!(f, "power"),
            ControlDomain::Temperature => write!(f, "temperature"),
        }
    }
}

/// What an evaluator wants done with the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision<T> {
    /// The device already reports the target value
    NoAction,
    /// Write the value to the device
    Apply(T),
}

/// A target that falls outside the range the device reports as valid
///
/// The write is still attempted; the device is the final authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWarning<T> {
    pub target: T,
    pub min: T,
    pub max: T,
}

impl<T: fmt::Display> fmt::Display for RangeWarning<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "target {} is outside the device range {}-{}",
            self.target, self.min, self.max
        )
    }
}

/// Result of evaluating one domain against a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation<T> {
    pub decision: Decision<T>,
    pub warning: Option<RangeWarning<T>>,
}

impl<T: Copy + PartialOrd> Evaluation<T> {
    /// Nothing to write
    pub fn unchanged() -> Self {
        Self {
            decision: Decision::NoAction,
            warning: None,
        }
    }

    /// Write `target`, flagging it when it falls outside `bounds`
    pub fn apply(target: T, bounds: Option<(T, T)>) -> Self {
        let warning = bounds
            .filter(|&(min, max)| target < min || target > max)
            .map(|(min, max)| RangeWarning { target, min, max });

        Self {
            decision: Decision::Apply(target),
            warning,
        }
    }
}

/// What happened to a decision on this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyMode {
    /// The mutation was issued to the device
    Applied,
    /// The mutation was evaluated but not issued
    DryRun,
    /// The device already matched the target
    Unchanged,
    /// The domain could not be read or written on this device
    Skipped,
}

impl fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyMode::Applied => write!(f, "applied"),
            ApplyMode::DryRun => write!(f, "dry-run"),
            ApplyMode::Unchanged => write!(f, "unchanged"),
            ApplyMode::Skipped => write!(f, "skipped"),
        }
    }
}

/// Structured record of one domain's outcome on one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionEvent {
    pub timestamp: SystemTime,
    pub device: String,
    pub domain: ControlDomain,
    pub decision: String,
    pub mode: ApplyMode,
    pub warning: Option<String>,
}

impl DecisionEvent {
    pub fn new(
        device: impl Into<String>,
        domain: ControlDomain,
        decision: impl Into<String>,
        mode: ApplyMode,
    ) -> Self {
        Self {
            timestamp: SystemTime::now(),
            device: device.into(),
            domain,
            decision: decision.into(),
            mode,
            warning: None,
        }
    }

    pub fn with_warning(mut self, warning: Option<String>) -> Self {
        self.warning = warning;
        self
    }
}

impl fmt::Display for DecisionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.device, self.domain, self.decision, self.mode
        )?;
        if let Some(warning) = &self.warning {
            write!(f, " - warning: {}", warning)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_within_bounds_has_no_warning() {
        let eval = Evaluation::apply(250u32, Some((100, 400)));
        assert_eq!(eval.decision, Decision::Apply(250));
        assert!(eval.warning.is_none());
    }

    #[test]
    fn test_apply_outside_bounds_warns() {
        let below = Evaluation::apply(50u32, Some((100, 400)));
        assert_eq!(below.decision, Decision::Apply(50));
        assert_eq!(
            below.warning,
            Some(RangeWarning {
                target: 50,
                min: 100,
                max: 400
            })
        );

        let above = Evaluation::apply(500u32, Some((100, 400)));
        assert!(above.warning.is_some());
    }

    #[test]
    fn test_apply_without_bounds() {
        let eval = Evaluation::apply(5u32, None);
        assert_eq!(eval.decision, Decision::Apply(5));
        assert!(eval.warning.is_none());
    }

    #[test]
    fn test_event_display() {
        let event = DecisionEvent::new("GPU-1", ControlDomain::Power, "set 250W", ApplyMode::DryRun)
            .with_warning(Some("out of range".to_string()));
        let text = event.to_string();
        assert!(text.contains("power"));
        assert!(text.contains("dry-run"));
        assert!(text.contains("out of range"));
    }
}
