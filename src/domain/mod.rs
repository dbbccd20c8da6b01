//! Domain models for nvgov
//!
//! This module contains all domain types with validation.
//! Types are validated on construction (fail-fast pattern).

pub mod decision;
pub mod fan;
pub mod gpu;
pub mod policy;
pub mod power;
pub mod snapshot;
pub mod thermal;

pub use decision::{ApplyMode, ControlDomain, Decision, DecisionEvent, Evaluation, RangeWarning};
pub use fan::{FanConstraints, FanCurve, FanCurvePoint, FanPolicy, FanSpeed};
pub use gpu::{DeviceSelector, GpuInfo};
pub use policy::{Policy, PolicyBuilder, RetryPolicy};
pub use power::{PowerConstraints, PowerLimit};
pub use snapshot::{DeviceSnapshot, FanState, PowerState};
pub use thermal::{AcousticLimits, Temperature};
