//! Trait definitions for GPU operations
//!
//! These traits are the capability interface between the control loop and
//! the hardware. Everything above them is testable against mocks.

use crate::domain::{
    AcousticLimits, DeviceSelector, FanConstraints, FanPolicy, FanSpeed, GpuInfo,
    PowerConstraints, PowerLimit, Temperature,
};
use crate::error::NvmlError;

/// Trait for GPU device operations
///
/// Setters take `&mut self`: a resolved device is exclusively owned by the
/// loop that resolved it.
pub trait GpuDevice {
    /// Get the GPU name
    fn name(&self) -> Result<String, NvmlError>;

    /// Get the GPU UUID
    fn uuid(&self) -> Result<String, NvmlError>;

    /// Get the GPU index
    fn index(&self) -> u32;

    /// Get GPU information
    fn info(&self) -> Result<GpuInfo, NvmlError> {
        let info = GpuInfo::new(self.index(), self.name()?, self.uuid()?);
        Ok(info.with_fan_count(self.fan_count().unwrap_or(0)))
    }

    // Temperature operations
    /// Get current GPU core temperature
    fn temperature(&self) -> Result<Temperature, NvmlError>;

    /// Get acoustic temperature limits (current/min/max)
    fn acoustic_limits(&self) -> Result<AcousticLimits, NvmlError>;

    /// Set acoustic temperature limit
    ///
    /// This tells the GPU to throttle to maintain a target temperature.
    fn set_acoustic_limit(&mut self, temp: Temperature) -> Result<(), NvmlError>;

    // Fan operations
    /// Get the number of fan controllers
    ///
    /// This counts controllers, which need not match the number of physical fans.
    fn fan_count(&self) -> Result<u32, NvmlError>;

    /// Get the aggregate fan speed the driver reports for the whole device
    fn fan_speed(&self) -> Result<FanSpeed, NvmlError>;

    /// Get current fan speed for a specific controller
    fn controller_fan_speed(&self, fan_idx: u32) -> Result<FanSpeed, NvmlError>;

    /// Get the speed of every controller, in index order
    fn fan_speeds(&self) -> Result<Vec<FanSpeed>, NvmlError> {
        (0..self.fan_count()?)
            .map(|idx| self.controller_fan_speed(idx))
            .collect()
    }

    /// Get the settable fan speed range
    fn fan_constraints(&self) -> Result<FanConstraints, NvmlError>;

    /// Set fan speed for a specific controller
    fn set_fan_speed(&mut self, fan_idx: u32, speed: FanSpeed) -> Result<(), NvmlError>;

    /// Get current fan control policy
    fn fan_policy(&self, fan_idx: u32) -> Result<FanPolicy, NvmlError>;

    /// Set fan control policy
    fn set_fan_policy(&mut self, fan_idx: u32, policy: FanPolicy) -> Result<(), NvmlError>;

    // Power operations
    /// Get the power limit configured on the device
    fn power_limit(&self) -> Result<PowerLimit, NvmlError>;

    /// Get the power limit the device actually enforces
    fn enforced_power_limit(&self) -> Result<PowerLimit, NvmlError>;

    /// Get power constraints (min/max)
    fn power_constraints(&self) -> Result<PowerConstraints, NvmlError>;

    /// Set power limit
    fn set_power_limit(&mut self, limit: PowerLimit) -> Result<(), NvmlError>;
}

/// An open session with the GPU management library
///
/// A session owns every device handle resolved from it; handles borrow the
/// session and must be dropped before it is closed.
pub trait GpuManager {
    /// The device type returned by this manager
    type Device<'a>: GpuDevice
    where
        Self: 'a;

    /// Get the number of GPU devices
    fn device_count(&self) -> Result<u32, NvmlError>;

    /// Get a device by index
    fn device_by_index(&self, index: u32) -> Result<Self::Device<'_>, NvmlError>;

    /// Get a device by UUID
    fn device_by_uuid(&self, uuid: &str) -> Result<Self::Device<'_>, NvmlError>;

    /// Get the first device whose name matches exactly
    fn device_by_name(&self, name: &str) -> Result<Self::Device<'_>, NvmlError> {
        for index in 0..self.device_count()? {
            let device = self.device_by_index(index)?;
            if device.name()? == name {
                return Ok(device);
            }
        }
        Err(NvmlError::DeviceNotFound(format!("no GPU named '{}'", name)))
    }

    /// Resolve the device a policy targets
    fn resolve(&self, selector: &DeviceSelector) -> Result<Self::Device<'_>, NvmlError> {
        match selector {
            DeviceSelector::Uuid(uuid) => self.device_by_uuid(uuid),
            DeviceSelector::Name(name) => self.device_by_name(name),
            DeviceSelector::Index(index) => self.device_by_index(*index),
        }
    }

    /// Describe every device
    fn list_devices(&self) -> Result<Vec<GpuInfo>, NvmlError> {
        (0..self.device_count()?)
            .map(|index| self.device_by_index(index)?.info())
            .collect()
    }

    /// Get driver version
    fn driver_version(&self) -> Result<String, NvmlError>;

    /// Release the session
    ///
    /// Calling this more than once is a no-op.
    fn close(&mut self) -> Result<(), NvmlError>;
}

/// Opens sessions with the GPU management library
pub trait SessionFactory {
    type Session: GpuManager;

    fn open(&self) -> Result<Self::Session, NvmlError>;
}

impl<F: SessionFactory> SessionFactory for &F {
    type Session = F::Session;

    fn open(&self) -> Result<Self::Session, NvmlError> {
        (**self).open()
    }
}
