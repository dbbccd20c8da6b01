//! Device state sampled once per control tick

use crate::domain::{AcousticLimits, FanConstraints, FanSpeed, PowerConstraints, PowerLimit, Temperature};
use serde::Serialize;

/// Fan readings needed by the fan evaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanState {
    /// Speed the driver reports for the device as a whole
    pub aggregate: FanSpeed,
    /// One reading per fan controller (not per physical fan)
    pub per_controller: Vec<FanSpeed>,
    /// Settable range, when the driver exposes it
    pub constraints: Option<FanConstraints>,
}

/// Power readings needed by the power evaluator
///
/// The enforced limit can diverge from the configured one when the board
/// shares a power or thermal budget, so both are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PowerState {
    pub current: PowerLimit,
    pub enforced: PowerLimit,
    pub constraints: PowerConstraints,
}

/// Everything one tick knows about the device
///
/// A field is `None` when its domain is inactive or could not be read on
/// this tick. The temperature is only sampled for the fan curve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub temperature: Option<Temperature>,
    pub fan: Option<FanState>,
    pub power: Option<PowerState>,
    pub acoustic: Option<AcousticLimits>,
}
