//! Control command implementation
//!
//! Runs the supervised control loop for continuous GPU management, or a
//! single tick per GPU in single-use mode.

use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, TickOutput};
use crate::commands::with_session;
use crate::config::Config;
use crate::domain::{DeviceSelector, Policy};
use crate::error::{AppError, Result};
use crate::nvml::{GpuManager, SessionFactory};
use crate::services::{run_isolated, summarize, Shutdown, Supervisor, TickReport};

/// Execute the control command
pub fn run_control<F>(
    factory: &F,
    config: &Config,
    shutdown: &Shutdown,
    format: OutputFormat,
) -> Result<()>
where
    F: SessionFactory + Sync,
{
    let mut policies = build_policies(factory, config)?;

    for policy in &policies {
        log::info!(
            "Policy for {}: fan={} power={:?} acoustic={:?} interval={:?} dry_run={}",
            policy.device(),
            policy
                .fan()
                .map(|curve| curve.to_string())
                .unwrap_or_else(|| "off".to_string()),
            policy.power(),
            policy.thermal(),
            policy.loop_interval(),
            policy.is_dry_run()
        );
    }

    if config.general.single_use {
        for report in run_single_use(factory, policies, shutdown)? {
            print_output(&TickOutput::from(&report), format)?;
        }
        return Ok(());
    }

    if policies.len() == 1 {
        let policy = policies.remove(0);
        let device = policy.device().clone();
        let outcome = Supervisor::new(factory, policy, shutdown.clone()).run_supervised()?;
        log::info!(
            "Control loop for {} stopped ({:?}, {} restarts)",
            device,
            outcome.exit,
            outcome.restarts
        );
        return Ok(());
    }

    let results = run_isolated(factory, policies, shutdown);
    summarize(&results)
}

/// One policy per targeted GPU
///
/// With a configured selector the policy targets that GPU alone. Otherwise
/// every GPU present gets the same policy, each addressed by index.
pub fn build_policies<F: SessionFactory>(factory: &F, config: &Config) -> Result<Vec<Policy>> {
    if let Some(selector) = config.gpu.selector() {
        return Ok(vec![config.to_policy(selector)?]);
    }

    // Validate before touching the driver
    let template = config.to_policy(DeviceSelector::Index(0))?;

    let count = with_session(factory, |session| Ok(session.device_count()?))?;
    if count == 0 {
        return Err(AppError::NoGpusFound);
    }

    Ok((0..count)
        .map(|index| template.for_device(DeviceSelector::Index(index)))
        .collect())
}

/// Run one tick per policy, each in its own session
///
/// Each tick is retried under its policy's retry settings. A failure the
/// retry policy gives up on stops the run; a shutdown request stops it
/// with the reports gathered so far.
pub fn run_single_use<F: SessionFactory>(
    factory: &F,
    policies: Vec<Policy>,
    shutdown: &Shutdown,
) -> Result<Vec<TickReport>> {
    let mut reports = Vec::with_capacity(policies.len());
    for policy in policies {
        match Supervisor::new(factory, policy, shutdown.clone()).tick_supervised()? {
            Some(report) => reports.push(report),
            None => break,
        }
    }
    Ok(reports)
}
