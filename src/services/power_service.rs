//! Power management service
//!
//! Keeps the GPU power limit at a fixed target.

use crate::domain::{Evaluation, PowerLimit, PowerState};
use crate::error::NvmlError;
use crate::nvml::GpuDevice;

/// Decide whether the power limit needs to be written
///
/// Nothing is written only when both the configured and the enforced limit
/// already equal the target. A target outside the device constraints is
/// still written; the driver decides whether to accept it.
pub fn evaluate_power(target: PowerLimit, state: &PowerState) -> Evaluation<PowerLimit> {
    if state.current == target && state.enforced == target {
        return Evaluation::unchanged();
    }

    Evaluation::apply(target, Some((state.constraints.min, state.constraints.max)))
}

/// Read the power readings the evaluator needs
pub fn read_power_state<D: GpuDevice>(device: &D) -> Result<PowerState, NvmlError> {
    Ok(PowerState {
        current: device.power_limit()?,
        enforced: device.enforced_power_limit()?,
        constraints: device.power_constraints()?,
    })
}

pub fn apply_power_limit<D: GpuDevice>(device: &mut D, limit: PowerLimit) -> Result<(), NvmlError> {
    device.set_power_limit(limit)?;
    log::debug!("Applied power limit {}", limit);
    Ok(())
}
