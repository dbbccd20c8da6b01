//! nvgov - NVML-based GPU governor library
//!
//! This library provides a supervised control loop that keeps GPU fan
//! speeds, power limits, and acoustic temperature thresholds at their
//! configured targets via NVIDIA's NVML library.
//!
//! # Modules
//!
//! - [`cli`]: Command-line interface definitions
//! - [`commands`]: Command handlers
//! - [`config`]: Configuration system
//! - [`domain`]: Domain models with validation
//! - [`error`]: Error types
//! - [`nvml`]: NVML abstraction layer
//! - [`services`]: Evaluators, control loop, and supervisor

pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod nvml;
pub mod services;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{AppError, Result};
