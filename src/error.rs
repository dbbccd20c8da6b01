//! Unified error types for nvgov
//!
//! This module defines all error types used throughout the application.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from NVML operations
    #[error("NVML error: {0}")]
    Nvml(#[from] NvmlError),

    /// Error from configuration parsing/validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from domain type validation
    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),

    /// No GPUs detected in the system
    #[error("No NVIDIA GPUs detected")]
    NoGpusFound,

    /// One or more isolated control instances failed
    #[error("{failed} of {total} GPU control instances failed")]
    InstancesFailed { failed: usize, total: usize },

    /// IO error (file operations, output)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Classify this error for the supervisor's retry decision
    ///
    /// Only capability interface failures are candidates for a retry;
    /// configuration and validation problems never resolve on their own.
    pub fn fault(&self) -> Option<FaultKind> {
        match self {
            AppError::Nvml(e) => Some(e.fault()),
            _ => None,
        }
    }
}

/// How a capability interface failure should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The selected device does not exist; never retried
    DeviceNotFound,
    /// The driver refused the operation
    PermissionDenied,
    /// The operation is not available on this device/driver combination
    Unsupported,
    /// Anything else reported by the driver
    Transient,
}

/// Errors from NVML wrapper operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NvmlError {
    /// Failed to initialize NVML library
    #[error("Failed to initialize NVML: {0}")]
    InitializationFailed(String),

    /// NVML library not found
    #[error("NVML library not found. Is the NVIDIA driver installed?")]
    LibraryNotFound,

    /// Session was already closed
    #[error("NVML session is closed")]
    SessionClosed,

    /// Device not found by index, name or UUID
    #[error("GPU device not found: {0}")]
    DeviceNotFound(String),

    /// Operation not supported by this GPU
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Insufficient permissions
    #[error("Insufficient permissions: {0}. Try running with sudo.")]
    InsufficientPermissions(String),

    /// Unknown NVML error
    #[error("NVML error: {0}")]
    Unknown(String),

    /// GPU is lost (fallen off bus, etc.)
    #[error("GPU is lost or has become inaccessible")]
    GpuLost,

    /// Invalid argument passed to NVML
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl NvmlError {
    /// Map this error onto the supervisor's fault taxonomy
    pub fn fault(&self) -> FaultKind {
        match self {
            NvmlError::DeviceNotFound(_) => FaultKind::DeviceNotFound,
            NvmlError::InsufficientPermissions(_) => FaultKind::PermissionDenied,
            NvmlError::NotSupported(_) => FaultKind::Unsupported,
            _ => FaultKind::Transient,
        }
    }

    /// Whether the operation is unavailable on this device
    pub fn is_unsupported(&self) -> bool {
        self.fault() == FaultKind::Unsupported
    }
}

/// Errors from domain type validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Invalid fan speed value (must be 0-100)
    #[error("Invalid fan speed: {0}% (must be 0-100)")]
    InvalidFanSpeed(i64),

    /// Invalid temperature value
    #[error("Invalid temperature: {0}°C")]
    InvalidTemperature(i32),

    /// Invalid value provided
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Invalid fan curve (malformed pair etc.)
    #[error("Invalid fan curve: {0}")]
    InvalidFanCurve(String),

    /// Two fan curve points share a temperature
    #[error("Fan curve has more than one point at {0}°C")]
    DuplicateCurveTemperature(i32),

    /// Negative or non-finite interval
    #[error("Invalid {name} interval: {value}s (must be a non-negative number of seconds)")]
    InvalidInterval { name: &'static str, value: f64 },

    /// Policy has no domain to control
    #[error("No control domain selected: configure a fan curve, a power limit, or an acoustic limit")]
    NoActiveDomain,
}

/// Errors from configuration parsing and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Invalid config value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_display() {
        let err = DomainError::InvalidFanSpeed(150);
        assert_eq!(err.to_string(), "Invalid fan speed: 150% (must be 0-100)");
    }

    #[test]
    fn test_nvml_error_display() {
        let err = NvmlError::LibraryNotFound;
        assert!(err.to_string().contains("NVIDIA driver"));
    }

    #[test]
    fn test_fault_classification() {
        assert_eq!(
            NvmlError::DeviceNotFound("GPU-x".into()).fault(),
            FaultKind::DeviceNotFound
        );
        assert_eq!(
            NvmlError::InsufficientPermissions("set".into()).fault(),
            FaultKind::PermissionDenied
        );
        assert!(NvmlError::NotSupported("acoustic".into()).is_unsupported());
        assert_eq!(NvmlError::GpuLost.fault(), FaultKind::Transient);
        assert_eq!(NvmlError::SessionClosed.fault(), FaultKind::Transient);
    }

    #[test]
    fn test_app_error_fault_only_for_nvml() {
        let app_err: AppError = NvmlError::GpuLost.into();
        assert_eq!(app_err.fault(), Some(FaultKind::Transient));

        let app_err: AppError = DomainError::NoActiveDomain.into();
        assert_eq!(app_err.fault(), None);
    }

    #[test]
    fn test_interval_error_display() {
        let err = DomainError::InvalidInterval {
            name: "loop",
            value: -5.0,
        };
        assert!(err.to_string().contains("loop"));
        assert!(err.to_string().contains("-5"));
    }
}
