//! Thermal threshold service
//!
//! Holds the acoustic temperature threshold at a fixed target. The GPU
//! throttles itself to stay below that threshold.

use crate::domain::{AcousticLimits, Evaluation, Temperature};
use crate::error::NvmlError;
use crate::nvml::GpuDevice;

/// Decide whether the acoustic threshold needs to be written
pub fn evaluate_thermal(target: Temperature, limits: &AcousticLimits) -> Evaluation<Temperature> {
    if limits.current == target {
        return Evaluation::unchanged();
    }

    Evaluation::apply(target, Some((limits.min, limits.max)))
}

pub fn apply_acoustic_limit<D: GpuDevice>(
    device: &mut D,
    target: Temperature,
) -> Result<(), NvmlError> {
    device.set_acoustic_limit(target)?;
    log::debug!("Applied acoustic limit {}", target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Decision;
    use crate::mock::{MockBackend, MockGpu};
    use crate::nvml::{GpuManager, SessionFactory};

    fn limits(current: i32) -> AcousticLimits {
        AcousticLimits::new(
            Temperature::new(current),
            Temperature::new(60),
            Temperature::new(90),
        )
    }

    #[test]
    fn test_no_action_at_target() {
        let eval = evaluate_thermal(Temperature::new(75), &limits(75));
        assert_eq!(eval.decision, Decision::NoAction);
    }

    #[test]
    fn test_apply_new_threshold() {
        let eval = evaluate_thermal(Temperature::new(70), &limits(80));
        assert_eq!(eval.decision, Decision::Apply(Temperature::new(70)));
        assert!(eval.warning.is_none());
    }

    #[test]
    fn test_out_of_range_threshold_warns() {
        let eval = evaluate_thermal(Temperature::new(50), &limits(80));
        assert_eq!(eval.decision, Decision::Apply(Temperature::new(50)));
        assert!(eval.warning.is_some());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let backend = MockBackend::new(vec![MockGpu::new(0)]);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();

        let target = Temperature::new(72);
        let eval = evaluate_thermal(target, &device.acoustic_limits().unwrap());
        assert!(matches!(eval.decision, Decision::Apply(_)));

        apply_acoustic_limit(&mut device, target).unwrap();
        let eval = evaluate_thermal(target, &device.acoustic_limits().unwrap());
        assert_eq!(eval.decision, Decision::NoAction);
    }
}
