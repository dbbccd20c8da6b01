//! Service layer for GPU control operations
//!
//! Evaluators decide what each control domain needs, the monitor runs them
//! on a cadence, and the supervisor keeps the NVML session healthy around it.

pub mod fan_service;
pub mod monitor;
pub mod power_service;
pub mod shutdown;
pub mod supervisor;
pub mod thermal_service;

pub use fan_service::evaluate_fan;
pub use monitor::{LoopExit, LoopState, Monitor, TickReport};
pub use power_service::evaluate_power;
pub use shutdown::Shutdown;
pub use supervisor::{run_isolated, summarize, Supervisor, SupervisorOutcome};
pub use thermal_service::evaluate_thermal;
