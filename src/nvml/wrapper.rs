//! NVML session implementation
//!
//! Provides the NVML-backed session (initialization, device discovery,
//! shutdown) and the factory the supervisor uses to open sessions.

use crate::error::NvmlError;
use crate::nvml::device::NvmlDevice;
use crate::nvml::traits::{GpuManager, SessionFactory};

use nvml_wrapper::Nvml;

/// Open NVML session
///
/// Closing shuts NVML down and drops every handle the driver holds for this
/// process. Dropping an open session closes it.
pub struct NvmlManager {
    nvml: Option<Nvml>,
}

impl NvmlManager {
    /// Initialize NVML and create a new session
    pub fn new() -> Result<Self, NvmlError> {
        let nvml = Nvml::init().map_err(|e| match e {
            nvml_wrapper::error::NvmlError::LibloadingError(_) => NvmlError::LibraryNotFound,
            nvml_wrapper::error::NvmlError::DriverNotLoaded => {
                NvmlError::InitializationFailed("NVIDIA driver not loaded".to_string())
            }
            nvml_wrapper::error::NvmlError::NoPermission => NvmlError::InsufficientPermissions(
                "Cannot initialize NVML".to_string(),
            ),
            other => NvmlError::InitializationFailed(other.to_string()),
        })?;

        Ok(Self { nvml: Some(nvml) })
    }

    fn nvml(&self) -> Result<&Nvml, NvmlError> {
        self.nvml.as_ref().ok_or(NvmlError::SessionClosed)
    }
}

impl GpuManager for NvmlManager {
    type Device<'a> = NvmlDevice<'a>;

    fn device_count(&self) -> Result<u32, NvmlError> {
        self.nvml()?
            .device_count()
            .map_err(NvmlDevice::convert_error)
    }

    fn device_by_index(&self, index: u32) -> Result<Self::Device<'_>, NvmlError> {
        let device = self.nvml()?.device_by_index(index).map_err(|e| match e {
            nvml_wrapper::error::NvmlError::NotFound
            | nvml_wrapper::error::NvmlError::InvalidArg => {
                NvmlError::DeviceNotFound(format!("no GPU at index {}", index))
            }
            other => NvmlDevice::convert_error(other),
        })?;

        Ok(NvmlDevice::new(device, index))
    }

    fn device_by_uuid(&self, uuid: &str) -> Result<Self::Device<'_>, NvmlError> {
        let device = self.nvml()?.device_by_uuid(uuid).map_err(|e| match e {
            nvml_wrapper::error::NvmlError::NotFound
            | nvml_wrapper::error::NvmlError::InvalidArg => {
                NvmlError::DeviceNotFound(format!("no GPU with UUID {}", uuid))
            }
            other => NvmlDevice::convert_error(other),
        })?;

        let index = device.index().map_err(NvmlDevice::convert_error)?;
        Ok(NvmlDevice::new(device, index))
    }

    fn driver_version(&self) -> Result<String, NvmlError> {
        self.nvml()?
            .sys_driver_version()
            .map_err(NvmlDevice::convert_error)
    }

    fn close(&mut self) -> Result<(), NvmlError> {
        match self.nvml.take() {
            Some(nvml) => nvml.shutdown().map_err(NvmlDevice::convert_error),
            None => Ok(()),
        }
    }
}

impl Drop for NvmlManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("NVML shutdown failed: {}", e);
        }
    }
}

/// Opens real NVML sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct NvmlSessionFactory;

impl SessionFactory for NvmlSessionFactory {
    type Session = NvmlManager;

    fn open(&self) -> Result<Self::Session, NvmlError> {
        NvmlManager::new()
    }
}
