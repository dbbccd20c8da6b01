//! Fan control service
//!
//! Maps the GPU temperature through a fan curve and drives every fan
//! controller to the resulting speed.

use crate::domain::{Evaluation, FanCurve, FanPolicy, FanSpeed, FanState, Temperature};
use crate::error::NvmlError;
use crate::nvml::GpuDevice;

/// Decide what fan speed the device should run at
///
/// The curve target is compared with the aggregate speed the driver reports;
/// a device already at the target needs no write. Targets outside the
/// settable range are still applied, with a warning.
pub fn evaluate_fan(
    curve: &FanCurve,
    temperature: Temperature,
    state: &FanState,
) -> Evaluation<FanSpeed> {
    let target = curve.speed_for_temperature(temperature.as_celsius());

    if target == state.aggregate {
        return Evaluation::unchanged();
    }

    Evaluation::apply(target, state.constraints.map(|c| (c.min, c.max)))
}

/// Read the fan readings the evaluator needs
///
/// Drivers that do not expose a settable range still allow speed control,
/// so missing constraints are not an error.
pub fn read_fan_state<D: GpuDevice>(device: &D) -> Result<FanState, NvmlError> {
    let aggregate = device.fan_speed()?;
    let per_controller = device.fan_speeds()?;
    let constraints = match device.fan_constraints() {
        Ok(constraints) => Some(constraints),
        Err(e) if e.is_unsupported() => None,
        Err(e) => return Err(e),
    };

    Ok(FanState {
        aggregate,
        per_controller,
        constraints,
    })
}

/// Set every fan controller to `speed`
pub fn apply_fan_speed<D: GpuDevice>(
    device: &mut D,
    state: &FanState,
    speed: FanSpeed,
) -> Result<(), NvmlError> {
    for fan_idx in 0..state.per_controller.len() as u32 {
        device.set_fan_speed(fan_idx, speed)?;
    }
    log::debug!("Applied fan speed {} to {} controllers", speed, state.per_controller.len());
    Ok(())
}

/// Set the control policy of every fan controller
///
/// Returns the number of controllers that were (or in dry-run, would have been)
/// changed.
pub fn set_fan_policy<D: GpuDevice>(
    device: &mut D,
    policy: FanPolicy,
    dry_run: bool,
) -> Result<u32, NvmlError> {
    let fan_count = device.fan_count()?;

    if dry_run {
        log::info!(
            "DRY RUN: Would set fan policy to {} on {} controllers",
            policy,
            fan_count
        );
        return Ok(fan_count);
    }

    for fan_idx in 0..fan_count {
        device.set_fan_policy(fan_idx, policy)?;
    }

    log::debug!("Set fan policy to {}", policy);
    Ok(fan_count)
}
