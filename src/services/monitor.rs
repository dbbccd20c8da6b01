//! Control loop monitor
//!
//! Runs the sample, evaluate, apply cycle against one resolved device at the
//! policy's cadence.

use crate::domain::{
    ApplyMode, ControlDomain, Decision, DecisionEvent, DeviceSnapshot, Evaluation, FanState,
    Policy,
};
use crate::error::NvmlError;
use crate::nvml::GpuDevice;
use crate::services::shutdown::Shutdown;
use crate::services::{fan_service, power_service, thermal_service};

use std::fmt;

/// Log target for decision events
pub const DECISION_TARGET: &str = "nvgov::decision";

/// Lifecycle of a control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Why a control loop stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Single-use mode finished its tick
    Completed,
    /// Shutdown was requested
    Cancelled,
}

/// Everything that happened on one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub snapshot: DeviceSnapshot,
    pub events: Vec<DecisionEvent>,
}

impl TickReport {
    /// The event for a domain, if that domain is active
    pub fn event(&self, domain: ControlDomain) -> Option<&DecisionEvent> {
        self.events.iter().find(|e| e.domain == domain)
    }
}

/// Control loop monitor
pub struct Monitor<'p> {
    policy: &'p Policy,
    state: LoopState,
}

impl<'p> Monitor<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            state: LoopState::Stopped,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Execute a single control tick on a device
    ///
    /// Domains are handled in a fixed order: fan, power, temperature. A
    /// domain the device does not support is skipped for this tick; any
    /// other failure ends the tick. The GPU temperature is read only when the
    /// fan curve needs it.
    pub fn tick<D: GpuDevice>(&self, device: &mut D) -> Result<TickReport, NvmlError> {
        let label = format!("GPU {}", device.index());
        let mut snapshot = DeviceSnapshot::default();
        let mut events = Vec::new();

        if let Some(curve) = self.policy.fan() {
            let step = device.temperature().and_then(|temperature| {
                snapshot.temperature = Some(temperature);
                let state: &FanState =
                    snapshot.fan.insert(fan_service::read_fan_state(device)?);
                let eval = fan_service::evaluate_fan(curve, temperature, state);
                let mode = self.execute(eval.decision, |speed| {
                    fan_service::apply_fan_speed(device, state, speed)
                })?;
                Ok(event(&label, ControlDomain::Fan, &eval, mode))
            });
            events.push(skip_unsupported(&label, ControlDomain::Fan, step)?);
        }

        if let Some(target) = self.policy.power() {
            let step = power_service::read_power_state(device).and_then(|state| {
                snapshot.power = Some(state);
                let eval = power_service::evaluate_power(target, &state);
                let mode = self.execute(eval.decision, |limit| {
                    power_service::apply_power_limit(device, limit)
                })?;
                Ok(event(&label, ControlDomain::Power, &eval, mode))
            });
            events.push(skip_unsupported(&label, ControlDomain::Power, step)?);
        }

        if let Some(target) = self.policy.thermal() {
            let step = device.acoustic_limits().and_then(|limits| {
                snapshot.acoustic = Some(limits);
                let eval = thermal_service::evaluate_thermal(target, &limits);
                let mode = self.execute(eval.decision, |temp| {
                    thermal_service::apply_acoustic_limit(device, temp)
                })?;
                Ok(event(&label, ControlDomain::Temperature, &eval, mode))
            });
            events.push(skip_unsupported(&label, ControlDomain::Temperature, step)?);
        }

        for event in &events {
            log_event(event);
        }

        Ok(TickReport { snapshot, events })
    }

    /// Run the control loop until single-use completes, shutdown is
    /// requested, or a tick fails
    pub fn run<D: GpuDevice>(
        &mut self,
        device: &mut D,
        shutdown: &Shutdown,
    ) -> Result<LoopExit, NvmlError> {
        self.state = LoopState::Running;
        let result = self.drive(device, shutdown);
        self.state = LoopState::Stopped;
        result
    }

    fn drive<D: GpuDevice>(
        &self,
        device: &mut D,
        shutdown: &Shutdown,
    ) -> Result<LoopExit, NvmlError> {
        loop {
            if shutdown.is_triggered() {
                return Ok(LoopExit::Cancelled);
            }

            self.tick(device)?;

            if self.policy.is_single_use() {
                log::info!("Single-use mode: exiting after one tick");
                return Ok(LoopExit::Completed);
            }

            if shutdown.wait(self.policy.loop_interval()) {
                return Ok(LoopExit::Cancelled);
            }
        }
    }

    fn execute<T: Copy>(
        &self,
        decision: Decision<T>,
        apply: impl FnOnce(T) -> Result<(), NvmlError>,
    ) -> Result<ApplyMode, NvmlError> {
        match decision {
            Decision::NoAction => Ok(ApplyMode::Unchanged),
            Decision::Apply(_) if self.policy.is_dry_run() => Ok(ApplyMode::DryRun),
            Decision::Apply(target) => {
                apply(target)?;
                Ok(ApplyMode::Applied)
            }
        }
    }
}

fn event<T: fmt::Display>(
    label: &str,
    domain: ControlDomain,
    eval: &Evaluation<T>,
    mode: ApplyMode,
) -> DecisionEvent {
    let decision = match &eval.decision {
        Decision::Apply(target) => format!("set {}", target),
        Decision::NoAction => "no change".to_string(),
    };
    DecisionEvent::new(label, domain, decision, mode)
        .with_warning(eval.warning.as_ref().map(ToString::to_string))
}

fn skip_unsupported(
    label: &str,
    domain: ControlDomain,
    step: Result<DecisionEvent, NvmlError>,
) -> Result<DecisionEvent, NvmlError> {
    match step {
        Err(e) if e.is_unsupported() => {
            log::warn!("[{}] {} control skipped this tick: {}", label, domain, e);
            Ok(DecisionEvent::new(label, domain, e.to_string(), ApplyMode::Skipped))
        }
        Err(e) => {
            log::error!("[{}] {} control failed: {}", label, domain, e);
            Err(e)
        }
        ok => ok,
    }
}

fn log_event(event: &DecisionEvent) {
    if let Some(warning) = &event.warning {
        log::warn!(target: DECISION_TARGET, "[{}] {}: {}", event.device, event.domain, warning);
    }
    match event.mode {
        ApplyMode::Applied | ApplyMode::DryRun => {
            log::info!(target: DECISION_TARGET, "{}", event)
        }
        ApplyMode::Unchanged | ApplyMode::Skipped => {
            log::debug!(target: DECISION_TARGET, "{}", event)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeviceSelector, FanCurve, FanCurvePoint, FanSpeed, PowerLimit, Temperature};
    use crate::mock::{MockBackend, MockGpu, Op};
    use crate::nvml::{GpuManager, SessionFactory};
    use std::time::{Duration, Instant};

    fn curve() -> FanCurve {
        FanCurve::new(
            vec![
                FanCurvePoint::new(60, FanSpeed::new(80).unwrap()),
                FanCurvePoint::new(40, FanSpeed::new(55).unwrap()),
            ],
            FanSpeed::new(30).unwrap(),
        )
        .unwrap()
    }

    fn all_domains() -> Policy {
        Policy::builder(DeviceSelector::Index(0))
            .fan_curve(curve())
            .power_limit_watts(250)
            .acoustic_limit_celsius(75)
            .build()
            .unwrap()
    }

    #[test]
    fn test_monitor_starts_stopped() {
        let policy = all_domains();
        let monitor = Monitor::new(&policy);
        assert_eq!(monitor.state(), LoopState::Stopped);
    }

    #[test]
    fn test_tick_applies_all_domains_in_order() {
        let backend = MockBackend::new(vec![MockGpu::new(0)]);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();
        let policy = all_domains();

        let report = Monitor::new(&policy).tick(&mut device).unwrap();
        let domains: Vec<_> = report.events.iter().map(|e| e.domain).collect();
        assert_eq!(
            domains,
            vec![ControlDomain::Fan, ControlDomain::Power, ControlDomain::Temperature]
        );
        assert!(report.events.iter().all(|e| e.mode == ApplyMode::Applied));

        assert_eq!(device.fan_speed().unwrap(), FanSpeed::new(55).unwrap());
        assert_eq!(device.power_limit().unwrap(), PowerLimit::from_watts(250));
        assert_eq!(device.acoustic_limits().unwrap().current, Temperature::new(75));
    }

    #[test]
    fn test_second_tick_is_idempotent() {
        let backend = MockBackend::new(vec![MockGpu::new(0)]);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();
        let policy = all_domains();
        let monitor = Monitor::new(&policy);

        monitor.tick(&mut device).unwrap();
        let applied = backend.mutations().len();

        let report = monitor.tick(&mut device).unwrap();
        assert!(report.events.iter().all(|e| e.mode == ApplyMode::Unchanged));
        assert_eq!(backend.mutations().len(), applied);
    }

    #[test]
    fn test_dry_run_never_mutates() {
        let backend = MockBackend::new(vec![MockGpu::new(0)]);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();
        let policy = Policy::builder(DeviceSelector::Index(0))
            .fan_curve(curve())
            .power_limit_watts(250)
            .acoustic_limit_celsius(75)
            .dry_run(true)
            .build()
            .unwrap();
        let monitor = Monitor::new(&policy);

        for temp in (20..90).step_by(7) {
            backend.set_temperature(0, Temperature::new(temp));
            let report = monitor.tick(&mut device).unwrap();
            assert!(report.events.iter().all(|e| e.mode == ApplyMode::DryRun));
        }
        assert!(backend.mutations().is_empty());
    }

    #[test]
    fn test_unsupported_domain_is_skipped() {
        let backend = MockBackend::new(vec![MockGpu::new(0).unsupported(Op::AcousticLimits)]);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();
        let policy = all_domains();

        let report = Monitor::new(&policy).tick(&mut device).unwrap();
        let thermal = report.event(ControlDomain::Temperature).unwrap();
        assert_eq!(thermal.mode, ApplyMode::Skipped);
        assert!(report.snapshot.acoustic.is_none());
        assert_eq!(
            report.event(ControlDomain::Power).unwrap().mode,
            ApplyMode::Applied
        );
    }

    #[test]
    fn test_unsupported_write_is_skipped() {
        let backend = MockBackend::new(vec![MockGpu::new(0).unsupported(Op::SetFanSpeed)]);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();
        let policy = all_domains();

        let report = Monitor::new(&policy).tick(&mut device).unwrap();
        assert_eq!(report.event(ControlDomain::Fan).unwrap().mode, ApplyMode::Skipped);
        assert_eq!(report.events.len(), 3);
        // The readings taken before the failed write are kept
        assert_eq!(report.snapshot.temperature, Some(Temperature::new(45)));
        assert_eq!(report.snapshot.fan.map(|f| f.per_controller.len()), Some(2));
    }

    #[test]
    fn test_power_only_policy_ignores_temperature() {
        let backend = MockBackend::new(vec![MockGpu::new(0).unsupported(Op::Temperature)]);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();
        let policy = Policy::builder(DeviceSelector::Index(0))
            .power_limit_watts(250)
            .build()
            .unwrap();

        let report = Monitor::new(&policy).tick(&mut device).unwrap();
        assert_eq!(
            report.event(ControlDomain::Power).unwrap().mode,
            ApplyMode::Applied
        );
        assert_eq!(report.snapshot.temperature, None);
        assert_eq!(device.power_limit().unwrap(), PowerLimit::from_watts(250));
    }

    #[test]
    fn test_unreadable_temperature_skips_fan_only() {
        let backend = MockBackend::new(vec![MockGpu::new(0).unsupported(Op::Temperature)]);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();
        let policy = all_domains();

        let report = Monitor::new(&policy).tick(&mut device).unwrap();
        assert_eq!(report.event(ControlDomain::Fan).unwrap().mode, ApplyMode::Skipped);
        assert!(report.snapshot.fan.is_none());
        assert_eq!(
            report.event(ControlDomain::Power).unwrap().mode,
            ApplyMode::Applied
        );
        assert_eq!(
            report.event(ControlDomain::Temperature).unwrap().mode,
            ApplyMode::Applied
        );
        assert_eq!(backend.mutations().len(), 2);
    }

    #[test]
    fn test_out_of_range_power_applied_with_warning() {
        let backend = MockBackend::new(vec![MockGpu::new(0)]);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();
        let policy = Policy::builder(DeviceSelector::Index(0))
            .power_limit_watts(600)
            .build()
            .unwrap();

        let report = Monitor::new(&policy).tick(&mut device).unwrap();
        let power = report.event(ControlDomain::Power).unwrap();
        assert_eq!(power.mode, ApplyMode::Applied);
        assert!(power.warning.is_some());
        assert_eq!(device.power_limit().unwrap(), PowerLimit::from_watts(600));
    }

    #[test]
    fn test_other_errors_end_the_tick() {
        let backend = MockBackend::new(vec![MockGpu::new(0)]);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();
        let policy = all_domains();
        backend.fail_call(backend.calls() + 1, NvmlError::GpuLost);

        let result = Monitor::new(&policy).tick(&mut device);
        assert_eq!(result.unwrap_err(), NvmlError::GpuLost);
    }

    #[test]
    fn test_single_use_does_not_sleep() {
        let backend = MockBackend::new(vec![MockGpu::new(0)]);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();
        let policy = Policy::builder(DeviceSelector::Index(0))
            .power_limit_watts(250)
            .loop_interval_secs(3600.0)
            .single_use(true)
            .build()
            .unwrap();
        let mut monitor = Monitor::new(&policy);

        let start = Instant::now();
        let exit = monitor.run(&mut device, &Shutdown::new()).unwrap();
        assert_eq!(exit, LoopExit::Completed);
        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(monitor.state(), LoopState::Stopped);
        assert_eq!(backend.mutations().len(), 1);
    }

    #[test]
    fn test_cancel_before_first_tick() {
        let backend = MockBackend::new(vec![MockGpu::new(0)]);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();
        let policy = all_domains();
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let exit = Monitor::new(&policy).run(&mut device, &shutdown).unwrap();
        assert_eq!(exit, LoopExit::Cancelled);
        assert!(backend.mutations().is_empty());
    }

    #[test]
    fn test_cancel_interrupts_sleep() {
        let backend = MockBackend::new(vec![MockGpu::new(0)]);
        let policy = Policy::builder(DeviceSelector::Index(0))
            .power_limit_watts(250)
            .loop_interval_secs(3600.0)
            .build()
            .unwrap();
        let shutdown = Shutdown::new();

        let start = Instant::now();
        let exit = std::thread::scope(|scope| {
            let worker = scope.spawn(|| {
                let session = backend.open().unwrap();
                let mut device = session.device_by_index(0).unwrap();
                let mut monitor = Monitor::new(&policy);
                monitor.run(&mut device, &shutdown)
            });
            while backend.mutations().is_empty() {
                std::thread::sleep(Duration::from_millis(5));
            }
            shutdown.trigger();
            worker.join().unwrap()
        })
        .unwrap();

        assert_eq!(exit, LoopExit::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
