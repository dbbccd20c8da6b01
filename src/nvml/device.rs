//! NVML device implementation
//!
//! Real implementation of GpuDevice trait using nvml-wrapper.

use crate::domain::{
    AcousticLimits, FanConstraints, FanPolicy, FanSpeed, PowerConstraints, PowerLimit, Temperature,
};
use crate::error::NvmlError;
use crate::nvml::traits::GpuDevice;

use libloading::{Library, Symbol};
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::Device;
use nvml_wrapper_sys::bindings::{
    nvmlDevice_t, nvmlReturn_enum_NVML_ERROR_GPU_IS_LOST,
    nvmlReturn_enum_NVML_ERROR_INVALID_ARGUMENT, nvmlReturn_enum_NVML_ERROR_NOT_FOUND,
    nvmlReturn_enum_NVML_ERROR_NOT_SUPPORTED, nvmlReturn_enum_NVML_ERROR_NO_PERMISSION,
    nvmlReturn_enum_NVML_SUCCESS,
};
use std::os::raw::{c_int, c_uint};

// FFI constants for acoustic temperature thresholds
// These are not exposed by nvml-wrapper's high-level API
const NVML_TEMPERATURE_THRESHOLD_ACOUSTIC_MIN: c_uint = 5;
const NVML_TEMPERATURE_THRESHOLD_ACOUSTIC_CURR: c_uint = 6;
const NVML_TEMPERATURE_THRESHOLD_ACOUSTIC_MAX: c_uint = 7;

/// NVML device wrapper implementing GpuDevice trait
pub struct NvmlDevice<'a> {
    device: Device<'a>,
    index: u32,
}

impl<'a> NvmlDevice<'a> {
    /// Create a new NVML device wrapper
    pub fn new(device: Device<'a>, index: u32) -> Self {
        Self { device, index }
    }

    /// Convert NVML error to our error type
    ///
    /// `NotFound` on a handle that was already resolved means the handle
    /// went stale, which a fresh session can recover from. Device lookups
    /// map it to `DeviceNotFound` themselves.
    pub(crate) fn convert_error(err: nvml_wrapper::error::NvmlError) -> NvmlError {
        use nvml_wrapper::error::NvmlError as NE;
        match err {
            NE::NotSupported => {
                NvmlError::NotSupported("Operation not supported by this GPU".to_string())
            }
            NE::NoPermission => {
                NvmlError::InsufficientPermissions("Insufficient permissions".to_string())
            }
            NE::NotFound => NvmlError::Unknown("device handle no longer valid".to_string()),
            NE::GpuLost => NvmlError::GpuLost,
            NE::InvalidArg => NvmlError::InvalidArgument("Invalid argument".to_string()),
            NE::Uninitialized => NvmlError::SessionClosed,
            _ => NvmlError::Unknown(err.to_string()),
        }
    }

    fn raw_handle(&self) -> nvmlDevice_t {
        // SAFETY: the handle stays valid for the lifetime of `self.device`,
        // which borrows the session.
        unsafe { self.device.handle() }
    }
}

impl GpuDevice for NvmlDevice<'_> {
    fn name(&self) -> Result<String, NvmlError> {
        self.device.name().map_err(Self::convert_error)
    }

    fn uuid(&self) -> Result<String, NvmlError> {
        self.device.uuid().map_err(Self::convert_error)
    }

    fn index(&self) -> u32 {
        self.index
    }

    fn temperature(&self) -> Result<Temperature, NvmlError> {
        let temp = self
            .device
            .temperature(TemperatureSensor::Gpu)
            .map_err(Self::convert_error)?;
        Ok(Temperature::from(temp))
    }

    fn acoustic_limits(&self) -> Result<AcousticLimits, NvmlError> {
        let handle = self.raw_handle();
        let library = load_library()?;

        let current = get_temperature_threshold_raw(
            &library,
            handle,
            NVML_TEMPERATURE_THRESHOLD_ACOUSTIC_CURR,
        )?;
        let min =
            get_temperature_threshold_raw(&library, handle, NVML_TEMPERATURE_THRESHOLD_ACOUSTIC_MIN)?;
        let max =
            get_temperature_threshold_raw(&library, handle, NVML_TEMPERATURE_THRESHOLD_ACOUSTIC_MAX)?;

        Ok(AcousticLimits::new(
            Temperature::new(current),
            Temperature::new(min),
            Temperature::new(max),
        ))
    }

    fn set_acoustic_limit(&mut self, temp: Temperature) -> Result<(), NvmlError> {
        let library = load_library()?;
        set_temperature_threshold_raw(
            &library,
            self.raw_handle(),
            NVML_TEMPERATURE_THRESHOLD_ACOUSTIC_CURR,
            temp.as_celsius(),
        )
    }

    fn fan_count(&self) -> Result<u32, NvmlError> {
        self.device.num_fans().map_err(Self::convert_error)
    }

    fn fan_speed(&self) -> Result<FanSpeed, NvmlError> {
        let library = load_library()?;
        get_fan_speed_raw(&library, self.raw_handle()).map(FanSpeed::saturating)
    }

    fn controller_fan_speed(&self, fan_idx: u32) -> Result<FanSpeed, NvmlError> {
        let speed = self
            .device
            .fan_speed(fan_idx)
            .map_err(Self::convert_error)?;
        Ok(FanSpeed::saturating(speed))
    }

    fn fan_constraints(&self) -> Result<FanConstraints, NvmlError> {
        let library = load_library()?;
        let (min, max) = get_min_max_fan_speed_raw(&library, self.raw_handle())?;
        Ok(FanConstraints::new(
            FanSpeed::saturating(min),
            FanSpeed::saturating(max),
        ))
    }

    fn set_fan_speed(&mut self, fan_idx: u32, speed: FanSpeed) -> Result<(), NvmlError> {
        self.device
            .set_fan_speed(fan_idx, speed.into())
            .map_err(Self::convert_error)
    }

    fn fan_policy(&self, fan_idx: u32) -> Result<FanPolicy, NvmlError> {
        use nvml_wrapper::enums::device::FanControlPolicy;

        let policy = self
            .device
            .fan_control_policy(fan_idx)
            .map_err(Self::convert_error)?;

        Ok(match policy {
            FanControlPolicy::TemperatureContinousSw => FanPolicy::Auto,
            FanControlPolicy::Manual => FanPolicy::Manual,
        })
    }

    fn set_fan_policy(&mut self, fan_idx: u32, policy: FanPolicy) -> Result<(), NvmlError> {
        use nvml_wrapper::enums::device::FanControlPolicy;

        let nvml_policy = match policy {
            FanPolicy::Auto => FanControlPolicy::TemperatureContinousSw,
            FanPolicy::Manual => FanControlPolicy::Manual,
        };

        self.device
            .set_fan_control_policy(fan_idx, nvml_policy)
            .map_err(Self::convert_error)
    }

    fn power_limit(&self) -> Result<PowerLimit, NvmlError> {
        let limit_mw = self
            .device
            .power_management_limit()
            .map_err(Self::convert_error)?;
        Ok(PowerLimit::from_milliwatts(limit_mw))
    }

    fn enforced_power_limit(&self) -> Result<PowerLimit, NvmlError> {
        let limit_mw = self
            .device
            .enforced_power_limit()
            .map_err(Self::convert_error)?;
        Ok(PowerLimit::from_milliwatts(limit_mw))
    }

    fn power_constraints(&self) -> Result<PowerConstraints, NvmlError> {
        let constraints = self
            .device
            .power_management_limit_constraints()
            .map_err(Self::convert_error)?;

        Ok(PowerConstraints::new(
            PowerLimit::from_milliwatts(constraints.min_limit),
            PowerLimit::from_milliwatts(constraints.max_limit),
        ))
    }

    fn set_power_limit(&mut self, limit: PowerLimit) -> Result<(), NvmlError> {
        self.device
            .set_power_management_limit(limit.as_milliwatts())
            .map_err(Self::convert_error)
    }
}

/// Load the NVML shared library for symbols nvml-wrapper does not expose
fn load_library() -> Result<Library, NvmlError> {
    // SAFETY: loading the vendor library runs its initialisers, which is
    // what nvml-wrapper itself does on init.
    unsafe { Library::new("libnvidia-ml.so.1") }
        .or_else(|_| unsafe { Library::new("libnvidia-ml.so") })
        .map_err(|_| NvmlError::LibraryNotFound)
}

fn symbol<'lib, T>(library: &'lib Library, name: &[u8]) -> Result<Symbol<'lib, T>, NvmlError> {
    // SAFETY: callers pair each symbol name with its C signature from nvml.h
    unsafe { library.get(name) }
        .map_err(|e| NvmlError::NotSupported(format!("Function not available: {}", e)))
}

/// Map a raw NVML return code
#[allow(non_upper_case_globals)]
fn check_return(code: c_uint, operation: &str) -> Result<(), NvmlError> {
    match code {
        nvmlReturn_enum_NVML_SUCCESS => Ok(()),
        nvmlReturn_enum_NVML_ERROR_NOT_SUPPORTED => Err(NvmlError::NotSupported(format!(
            "{} not supported on this GPU",
            operation
        ))),
        nvmlReturn_enum_NVML_ERROR_NO_PERMISSION => Err(NvmlError::InsufficientPermissions(
            format!("Root privileges required for {}", operation),
        )),
        nvmlReturn_enum_NVML_ERROR_INVALID_ARGUMENT => {
            Err(NvmlError::InvalidArgument(operation.to_string()))
        }
        nvmlReturn_enum_NVML_ERROR_NOT_FOUND => Err(NvmlError::Unknown(format!(
            "device handle went stale during {}",
            operation
        ))),
        nvmlReturn_enum_NVML_ERROR_GPU_IS_LOST => Err(NvmlError::GpuLost),
        other => Err(NvmlError::Unknown(format!(
            "{} failed with NVML error code {}",
            operation, other
        ))),
    }
}

/// Get temperature threshold using raw FFI
fn get_temperature_threshold_raw(
    library: &Library,
    handle: nvmlDevice_t,
    threshold_type: c_uint,
) -> Result<i32, NvmlError> {
    type GetThresholdFn = unsafe extern "C" fn(nvmlDevice_t, c_uint, *mut c_uint) -> c_uint;

    let func: Symbol<GetThresholdFn> = symbol(library, b"nvmlDeviceGetTemperatureThreshold\0")?;

    let mut temp: c_uint = 0;
    // SAFETY: `temp` outlives the call and the handle is valid
    let result = unsafe { func(handle, threshold_type, &mut temp) };
    check_return(result, "reading the acoustic threshold")?;

    Ok(temp as i32)
}

/// Set temperature threshold using raw FFI
fn set_temperature_threshold_raw(
    library: &Library,
    handle: nvmlDevice_t,
    threshold_type: c_uint,
    temp: i32,
) -> Result<(), NvmlError> {
    type SetThresholdFn = unsafe extern "C" fn(nvmlDevice_t, c_uint, *mut c_int) -> c_uint;

    let func: Symbol<SetThresholdFn> = symbol(library, b"nvmlDeviceSetTemperatureThreshold\0")?;

    let mut temp_val = temp as c_int;
    // SAFETY: `temp_val` outlives the call and the handle is valid
    let result = unsafe { func(handle, threshold_type, &mut temp_val) };
    check_return(result, "setting the acoustic threshold")
}

/// Get the device-wide fan speed using raw FFI
fn get_fan_speed_raw(library: &Library, handle: nvmlDevice_t) -> Result<u32, NvmlError> {
    type GetFanSpeedFn = unsafe extern "C" fn(nvmlDevice_t, *mut c_uint) -> c_uint;

    let func: Symbol<GetFanSpeedFn> = symbol(library, b"nvmlDeviceGetFanSpeed\0")?;

    let mut speed: c_uint = 0;
    // SAFETY: `speed` outlives the call and the handle is valid
    let result = unsafe { func(handle, &mut speed) };
    check_return(result, "reading the fan speed")?;

    Ok(speed)
}

/// Get the settable fan speed range using raw FFI
fn get_min_max_fan_speed_raw(
    library: &Library,
    handle: nvmlDevice_t,
) -> Result<(u32, u32), NvmlError> {
    type GetMinMaxFn = unsafe extern "C" fn(nvmlDevice_t, *mut c_uint, *mut c_uint) -> c_uint;

    let func: Symbol<GetMinMaxFn> = symbol(library, b"nvmlDeviceGetMinMaxFanSpeed\0")?;

    let mut min: c_uint = 0;
    let mut max: c_uint = 0;
    // SAFETY: both out-pointers outlive the call and the handle is valid
    let result = unsafe { func(handle, &mut min, &mut max) };
    check_return(result, "reading the fan speed range")?;

    Ok((min, max))
}
