//! Mock implementations for testing
//!
//! Provides a mock NVML backend for unit testing without real hardware.
//! Every session opened from a `MockBackend` sees the same device state, so
//! changes survive a session restart the way they do on a real GPU. The
//! backend counts calls, can fail any call by index, records every mutation,
//! and tracks how many sessions are open at once.

use crate::domain::{
    AcousticLimits, FanConstraints, FanPolicy, FanSpeed, PowerConstraints, PowerLimit, Temperature,
};
use crate::error::NvmlError;
use crate::nvml::{GpuDevice, GpuManager, SessionFactory};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Device operations that can be marked unsupported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Temperature,
    AcousticLimits,
    SetAcousticLimit,
    FanCount,
    FanSpeed,
    ControllerFanSpeed,
    FanConstraints,
    SetFanSpeed,
    FanPolicy,
    SetFanPolicy,
    PowerLimit,
    EnforcedPowerLimit,
    PowerConstraints,
    SetPowerLimit,
}

/// A mutation issued to a mock device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    FanSpeed { gpu: u32, fan: u32, speed: FanSpeed },
    FanPolicy { gpu: u32, fan: u32, policy: FanPolicy },
    PowerLimit { gpu: u32, limit: PowerLimit },
    AcousticLimit { gpu: u32, limit: Temperature },
}

/// State of one mock GPU
#[derive(Debug, Clone)]
pub struct MockGpu {
    index: u32,
    name: String,
    uuid: String,
    temperature: Temperature,
    fan_speeds: Vec<FanSpeed>,
    fan_policies: Vec<FanPolicy>,
    fan_constraints: Option<FanConstraints>,
    power_limit: PowerLimit,
    enforced_power_limit: PowerLimit,
    power_constraints: PowerConstraints,
    acoustic: AcousticLimits,
    unsupported: HashSet<Op>,
}

impl MockGpu {
    /// Create a mock GPU with two fan controllers at 50%
    pub fn new(index: u32) -> Self {
        let half = FanSpeed::saturating(50);
        Self {
            index,
            name: format!("Mock GPU {}", index),
            uuid: format!("GPU-MOCK-{:04}", index),
            temperature: Temperature::new(45),
            fan_speeds: vec![half; 2],
            fan_policies: vec![FanPolicy::Auto; 2],
            fan_constraints: Some(FanConstraints::new(
                FanSpeed::saturating(30),
                FanSpeed::saturating(100),
            )),
            power_limit: PowerLimit::from_watts(300),
            enforced_power_limit: PowerLimit::from_watts(300),
            power_constraints: PowerConstraints::new(
                PowerLimit::from_watts(100),
                PowerLimit::from_watts(400),
            ),
            acoustic: AcousticLimits::new(
                Temperature::new(80),
                Temperature::new(60),
                Temperature::new(90),
            ),
            unsupported: HashSet::new(),
        }
    }

    /// Builder: set name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder: set UUID
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    pub fn with_temperature(mut self, temp: Temperature) -> Self {
        self.temperature = temp;
        self
    }

    /// Builder: set fan controller count
    pub fn with_fan_count(mut self, count: usize) -> Self {
        let speed = self.fan_speeds.first().copied().unwrap_or(FanSpeed::saturating(50));
        self.fan_speeds = vec![speed; count];
        self.fan_policies = vec![FanPolicy::Auto; count];
        self
    }

    pub fn without_fan_constraints(mut self) -> Self {
        self.fan_constraints = None;
        self
    }

    /// Builder: make the enforced limit diverge from the configured one
    pub fn with_enforced_power_limit(mut self, limit: PowerLimit) -> Self {
        self.enforced_power_limit = limit;
        self
    }

    /// Builder: make `op` fail with `NotSupported`
    pub fn unsupported(mut self, op: Op) -> Self {
        self.unsupported.insert(op);
        self
    }
}

#[derive(Debug, Default)]
struct BackendState {
    gpus: Vec<MockGpu>,
    driver_version: String,
    calls: u64,
    faults: HashMap<u64, NvmlError>,
    close_faults: VecDeque<NvmlError>,
    mutations: Vec<Mutation>,
    opens: u32,
    closes: u32,
    live: u32,
    max_live: u32,
    leaked: u32,
}

/// Shared mock NVML backend; also the factory for mock sessions
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MockBackend {
    pub fn new(gpus: Vec<MockGpu>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState {
                gpus,
                driver_version: "535.154.05".to_string(),
                ..BackendState::default()
            })),
        }
    }

    /// Create a backend with `count` default GPUs
    pub fn with_gpus(count: u32) -> Self {
        Self::new((0..count).map(MockGpu::new).collect())
    }

    pub fn with_driver_version(self, version: impl Into<String>) -> Self {
        self.lock().driver_version = version.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count a call and fail it if a fault is planned for it
    fn call(&self) -> Result<MutexGuard<'_, BackendState>, NvmlError> {
        let mut state = self.lock();
        state.calls += 1;
        let call = state.calls;
        match state.faults.remove(&call) {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }

    /// Fail the `n`th call (1-based, counting session opens)
    pub fn fail_call(&self, n: u64, error: NvmlError) {
        self.lock().faults.insert(n, error);
    }

    /// Fail the next `k` calls
    pub fn fail_first(&self, k: u64, error: NvmlError) {
        let mut state = self.lock();
        let start = state.calls;
        for n in start + 1..=start + k {
            state.faults.insert(n, error.clone());
        }
    }

    /// Fail the next session close
    ///
    /// The session still ends and counts as closed; only the result of
    /// `close` carries the error. Closes are not counted as calls.
    pub fn fail_next_close(&self, error: NvmlError) {
        self.lock().close_faults.push_back(error);
    }

    pub fn set_temperature(&self, index: u32, temp: Temperature) {
        if let Some(gpu) = self.lock().gpus.get_mut(index as usize) {
            gpu.temperature = temp;
        }
    }

    pub fn calls(&self) -> u64 {
        self.lock().calls
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    /// Sessions opened successfully
    pub fn opens(&self) -> u32 {
        self.lock().opens
    }

    pub fn closes(&self) -> u32 {
        self.lock().closes
    }

    /// Sessions dropped without being closed
    pub fn leaked(&self) -> u32 {
        self.lock().leaked
    }

    /// Most sessions open at the same time
    pub fn max_live(&self) -> u32 {
        self.lock().max_live
    }
}

impl SessionFactory for MockBackend {
    type Session = MockManager;

    fn open(&self) -> Result<Self::Session, NvmlError> {
        let mut state = self.call()?;
        state.opens += 1;
        state.live += 1;
        state.max_live = state.max_live.max(state.live);
        drop(state);

        Ok(MockManager {
            backend: self.clone(),
            open: true,
        })
    }
}

/// Mock NVML session
#[derive(Debug)]
pub struct MockManager {
    backend: MockBackend,
    open: bool,
}

impl MockManager {
    fn call(&self) -> Result<MutexGuard<'_, BackendState>, NvmlError> {
        if !self.open {
            return Err(NvmlError::SessionClosed);
        }
        self.backend.call()
    }
}

impl GpuManager for MockManager {
    type Device<'a> = MockDevice<'a>;

    fn device_count(&self) -> Result<u32, NvmlError> {
        Ok(self.call()?.gpus.len() as u32)
    }

    fn device_by_index(&self, index: u32) -> Result<Self::Device<'_>, NvmlError> {
        if (index as usize) < self.call()?.gpus.len() {
            Ok(MockDevice {
                session: self,
                index,
            })
        } else {
            Err(NvmlError::DeviceNotFound(format!("no GPU at index {}", index)))
        }
    }

    fn device_by_uuid(&self, uuid: &str) -> Result<Self::Device<'_>, NvmlError> {
        let index = self
            .call()?
            .gpus
            .iter()
            .find(|gpu| gpu.uuid == uuid)
            .map(|gpu| gpu.index)
            .ok_or_else(|| NvmlError::DeviceNotFound(format!("no GPU with UUID {}", uuid)))?;

        Ok(MockDevice {
            session: self,
            index,
        })
    }

    fn driver_version(&self) -> Result<String, NvmlError> {
        Ok(self.call()?.driver_version.clone())
    }

    fn close(&mut self) -> Result<(), NvmlError> {
        if self.open {
            self.open = false;
            let mut state = self.backend.lock();
            state.closes += 1;
            state.live -= 1;
            if let Some(error) = state.close_faults.pop_front() {
                return Err(error);
            }
        }
        Ok(())
    }
}

impl Drop for MockManager {
    fn drop(&mut self) {
        if self.open {
            let mut state = self.backend.lock();
            state.leaked += 1;
            state.live -= 1;
        }
    }
}

/// Handle to a mock GPU, borrowed from its session
#[derive(Debug)]
pub struct MockDevice<'a> {
    session: &'a MockManager,
    index: u32,
}

impl MockDevice<'_> {
    fn with_gpu<T>(
        &self,
        op: Op,
        f: impl FnOnce(&mut MockGpu, &mut Vec<Mutation>) -> Result<T, NvmlError>,
    ) -> Result<T, NvmlError> {
        let mut guard = self.session.call()?;
        let state = &mut *guard;
        let gpu = state
            .gpus
            .get_mut(self.index as usize)
            .ok_or(NvmlError::GpuLost)?;

        if gpu.unsupported.contains(&op) {
            return Err(NvmlError::NotSupported(format!("{:?}", op)));
        }
        f(gpu, &mut state.mutations)
    }
}

fn check_fan(gpu: &MockGpu, fan_idx: u32) -> Result<usize, NvmlError> {
    let idx = fan_idx as usize;
    if idx >= gpu.fan_speeds.len() {
        return Err(NvmlError::InvalidArgument(format!(
            "Fan {} not found (count: {})",
            fan_idx,
            gpu.fan_speeds.len()
        )));
    }
    Ok(idx)
}

impl GpuDevice for MockDevice<'_> {
    fn name(&self) -> Result<String, NvmlError> {
        Ok(self.session.call()?.gpus[self.index as usize].name.clone())
    }

    fn uuid(&self) -> Result<String, NvmlError> {
        Ok(self.session.call()?.gpus[self.index as usize].uuid.clone())
    }

    fn index(&self) -> u32 {
        self.index
    }

    fn temperature(&self) -> Result<Temperature, NvmlError> {
        self.with_gpu(Op::Temperature, |gpu, _| Ok(gpu.temperature))
    }

    fn acoustic_limits(&self) -> Result<AcousticLimits, NvmlError> {
        self.with_gpu(Op::AcousticLimits, |gpu, _| Ok(gpu.acoustic))
    }

    fn set_acoustic_limit(&mut self, temp: Temperature) -> Result<(), NvmlError> {
        let index = self.index;
        self.with_gpu(Op::SetAcousticLimit, |gpu, mutations| {
            mutations.push(Mutation::AcousticLimit {
                gpu: index,
                limit: temp,
            });
            gpu.acoustic.current = temp;
            Ok(())
        })
    }

    fn fan_count(&self) -> Result<u32, NvmlError> {
        self.with_gpu(Op::FanCount, |gpu, _| Ok(gpu.fan_speeds.len() as u32))
    }

    fn fan_speed(&self) -> Result<FanSpeed, NvmlError> {
        self.with_gpu(Op::FanSpeed, |gpu, _| {
            gpu.fan_speeds
                .first()
                .copied()
                .ok_or_else(|| NvmlError::NotSupported("device has no fans".to_string()))
        })
    }

    fn controller_fan_speed(&self, fan_idx: u32) -> Result<FanSpeed, NvmlError> {
        self.with_gpu(Op::ControllerFanSpeed, |gpu, _| {
            Ok(gpu.fan_speeds[check_fan(gpu, fan_idx)?])
        })
    }

    fn fan_constraints(&self) -> Result<FanConstraints, NvmlError> {
        self.with_gpu(Op::FanConstraints, |gpu, _| {
            gpu.fan_constraints
                .ok_or_else(|| NvmlError::NotSupported("fan constraints".to_string()))
        })
    }

    fn set_fan_speed(&mut self, fan_idx: u32, speed: FanSpeed) -> Result<(), NvmlError> {
        let index = self.index;
        self.with_gpu(Op::SetFanSpeed, |gpu, mutations| {
            let idx = check_fan(gpu, fan_idx)?;
            mutations.push(Mutation::FanSpeed {
                gpu: index,
                fan: fan_idx,
                speed,
            });
            gpu.fan_speeds[idx] = speed;
            Ok(())
        })
    }

    fn fan_policy(&self, fan_idx: u32) -> Result<FanPolicy, NvmlError> {
        self.with_gpu(Op::FanPolicy, |gpu, _| {
            Ok(gpu.fan_policies[check_fan(gpu, fan_idx)?])
        })
    }

    fn set_fan_policy(&mut self, fan_idx: u32, policy: FanPolicy) -> Result<(), NvmlError> {
        let index = self.index;
        self.with_gpu(Op::SetFanPolicy, |gpu, mutations| {
            let idx = check_fan(gpu, fan_idx)?;
            mutations.push(Mutation::FanPolicy {
                gpu: index,
                fan: fan_idx,
                policy,
            });
            gpu.fan_policies[idx] = policy;
            Ok(())
        })
    }

    fn power_limit(&self) -> Result<PowerLimit, NvmlError> {
        self.with_gpu(Op::PowerLimit, |gpu, _| Ok(gpu.power_limit))
    }

    fn enforced_power_limit(&self) -> Result<PowerLimit, NvmlError> {
        self.with_gpu(Op::EnforcedPowerLimit, |gpu, _| Ok(gpu.enforced_power_limit))
    }

    fn power_constraints(&self) -> Result<PowerConstraints, NvmlError> {
        self.with_gpu(Op::PowerConstraints, |gpu, _| Ok(gpu.power_constraints))
    }

    fn set_power_limit(&mut self, limit: PowerLimit) -> Result<(), NvmlError> {
        let index = self.index;
        self.with_gpu(Op::SetPowerLimit, |gpu, mutations| {
            mutations.push(Mutation::PowerLimit { gpu: index, limit });
            gpu.power_limit = limit;
            gpu.enforced_power_limit = limit;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeviceSelector;

    #[test]
    fn test_mock_device_defaults() {
        let backend = MockBackend::with_gpus(1);
        let session = backend.open().unwrap();
        let device = session.device_by_index(0).unwrap();

        assert_eq!(device.index(), 0);
        assert_eq!(device.fan_count().unwrap(), 2);
        assert_eq!(device.temperature().unwrap().as_celsius(), 45);
        assert_eq!(device.power_limit().unwrap().as_watts(), 300);
    }

    #[test]
    fn test_state_survives_sessions() {
        let backend = MockBackend::with_gpus(1);
        {
            let mut session = backend.open().unwrap();
            let mut device = session.device_by_index(0).unwrap();
            device.set_power_limit(PowerLimit::from_watts(250)).unwrap();
            drop(device);
            session.close().unwrap();
        }

        let session = backend.open().unwrap();
        let device = session.device_by_index(0).unwrap();
        assert_eq!(device.power_limit().unwrap().as_watts(), 250);
    }

    #[test]
    fn test_session_accounting() {
        let backend = MockBackend::with_gpus(1);
        let mut session = backend.open().unwrap();
        assert_eq!(backend.opens(), 1);

        session.close().unwrap();
        session.close().unwrap();
        assert_eq!(backend.closes(), 1);
        assert!(matches!(session.device_count(), Err(NvmlError::SessionClosed)));

        drop(backend.open().unwrap());
        assert_eq!(backend.leaked(), 1);
        assert_eq!(backend.max_live(), 1);
    }

    #[test]
    fn test_close_fault_still_closes() {
        let backend = MockBackend::with_gpus(1);
        backend.fail_next_close(NvmlError::Unknown("shutdown".to_string()));

        let mut session = backend.open().unwrap();
        assert!(matches!(session.close(), Err(NvmlError::Unknown(_))));
        assert_eq!(session.close(), Ok(()));
        assert_eq!(backend.closes(), 1);
        assert!(matches!(session.device_count(), Err(NvmlError::SessionClosed)));

        drop(session);
        assert_eq!(backend.leaked(), 0);
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_planned_fault() {
        let backend = MockBackend::with_gpus(1);
        backend.fail_call(2, NvmlError::GpuLost);

        let session = backend.open().unwrap();
        assert_eq!(session.device_count(), Err(NvmlError::GpuLost));
        assert_eq!(session.device_count(), Ok(1));
        assert_eq!(backend.calls(), 3);
    }

    #[test]
    fn test_unsupported_op() {
        let backend = MockBackend::new(vec![MockGpu::new(0).unsupported(Op::PowerLimit)]);
        let session = backend.open().unwrap();
        let device = session.device_by_index(0).unwrap();

        assert!(device.power_limit().unwrap_err().is_unsupported());
        assert!(device.enforced_power_limit().is_ok());
    }

    #[test]
    fn test_resolve_selectors() {
        let backend = MockBackend::new(vec![
            MockGpu::new(0).with_name("RTX 4080"),
            MockGpu::new(1).with_name("RTX 4090").with_uuid("GPU-abc"),
        ]);
        let session = backend.open().unwrap();

        let by_name = session
            .resolve(&DeviceSelector::Name("RTX 4090".to_string()))
            .unwrap();
        assert_eq!(by_name.index(), 1);

        let by_uuid = session
            .resolve(&DeviceSelector::Uuid("GPU-abc".to_string()))
            .unwrap();
        assert_eq!(by_uuid.index(), 1);

        let missing = session.resolve(&DeviceSelector::Name("RTX".to_string()));
        assert!(matches!(missing, Err(NvmlError::DeviceNotFound(_))));

        assert!(session.resolve(&DeviceSelector::Index(5)).is_err());
    }

    #[test]
    fn test_set_fan_speed_out_of_range() {
        let backend = MockBackend::with_gpus(1);
        let session = backend.open().unwrap();
        let mut device = session.device_by_index(0).unwrap();

        let result = device.set_fan_speed(5, FanSpeed::saturating(50));
        assert!(matches!(result, Err(NvmlError::InvalidArgument(_))));
        assert!(backend.mutations().is_empty());
    }
}
