//! Session supervisor
//!
//! Owns the NVML session lifecycle around a control loop: open, resolve the
//! target device, run, close. Failures the retry policy allows are followed
//! by a fresh session and a fresh tick.

use crate::domain::{DeviceSelector, Policy};
use crate::error::{AppError, NvmlError, Result};
use crate::nvml::{GpuManager, SessionFactory};
use crate::services::monitor::{LoopExit, Monitor, TickReport};
use crate::services::shutdown::Shutdown;

/// Oldest driver branch known to support every control in this tool
const MIN_DRIVER_MAJOR: u32 = 520;

/// How a supervised run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOutcome {
    pub exit: LoopExit,
    /// Sessions reopened after a failure
    pub restarts: u32,
}

/// Supervises the control loop for one GPU
pub struct Supervisor<F: SessionFactory> {
    factory: F,
    policy: Policy,
    shutdown: Shutdown,
}

impl<F: SessionFactory> Supervisor<F> {
    pub fn new(factory: F, policy: Policy, shutdown: Shutdown) -> Self {
        Self {
            factory,
            policy,
            shutdown,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Open a session, run exactly one tick, and close the session
    ///
    /// Errors are returned as-is; nothing is retried.
    pub fn run_once(&self) -> Result<TickReport> {
        self.in_session(|session| self.tick_in(session))
    }

    /// Run exactly one tick under the retry policy
    ///
    /// Each failed attempt is followed by a fresh session, as in
    /// [`run_supervised`](Self::run_supervised). Returns `None` when shutdown
    /// arrives before a tick completes.
    pub fn tick_supervised(&self) -> Result<Option<TickReport>> {
        let (report, restarts) = self.supervise(|session| self.tick_in(session))?;
        if restarts > 0 {
            log::info!(
                "Tick for {} succeeded after {} restarts",
                self.policy.device(),
                restarts
            );
        }
        Ok(report)
    }

    /// Run the control loop, restarting from a fresh session after each
    /// retryable failure
    pub fn run_supervised(&self) -> Result<SupervisorOutcome> {
        let (exit, restarts) = self.supervise(|session| self.run_in(session))?;
        Ok(SupervisorOutcome {
            exit: exit.unwrap_or(LoopExit::Cancelled),
            restarts,
        })
    }

    /// Retry `attempt` in a fresh session until it succeeds, the retry
    /// policy refuses, or shutdown is requested (`None`)
    fn supervise<T>(
        &self,
        attempt: impl Fn(&F::Session) -> Result<T>,
    ) -> Result<(Option<T>, u32)> {
        let mut restarts = 0;

        loop {
            if self.shutdown.is_triggered() {
                return Ok((None, restarts));
            }

            let error = match self.in_session(&attempt) {
                Ok(value) => return Ok((Some(value), restarts)),
                Err(e) => e,
            };

            log::error!("Control loop for {} failed: {}", self.policy.device(), error);

            let retry = self.policy.retry();
            if !retry.allows(error.fault(), restarts) {
                return Err(error);
            }

            log::info!(
                "Restarting control loop for {} in {:?}...",
                self.policy.device(),
                retry.interval
            );
            if self.shutdown.wait(retry.interval) {
                return Ok((None, restarts));
            }
            restarts += 1;
        }
    }

    fn in_session<T>(&self, attempt: impl Fn(&F::Session) -> Result<T>) -> Result<T> {
        let mut session = self.open()?;
        let result = attempt(&session);
        finish(&mut session, result)
    }

    fn tick_in(&self, session: &F::Session) -> Result<TickReport> {
        let mut device = session.resolve(self.policy.device())?;
        Ok(Monitor::new(&self.policy).tick(&mut device)?)
    }

    fn run_in(&self, session: &F::Session) -> Result<LoopExit> {
        let mut device = session.resolve(self.policy.device())?;
        log::info!("Controlling {}", self.policy.device());
        Ok(Monitor::new(&self.policy).run(&mut device, &self.shutdown)?)
    }

    fn open(&self) -> std::result::Result<F::Session, NvmlError> {
        let session = self.factory.open()?;
        check_driver(&session);
        Ok(session)
    }
}

/// Close the session on every path
///
/// A close failure is only reported when nothing else went wrong.
pub(crate) fn finish<M: GpuManager, T>(session: &mut M, result: Result<T>) -> Result<T> {
    match (result, session.close()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            log::warn!("Failed to close NVML session: {}", close_err);
            Err(e)
        }
    }
}

fn check_driver<M: GpuManager>(session: &M) {
    match session.driver_version() {
        Ok(version) => {
            let major = version.split('.').next().and_then(|m| m.parse::<u32>().ok());
            match major {
                Some(major) if major < MIN_DRIVER_MAJOR => log::warn!(
                    "Driver {} is older than {}; some controls may be unavailable",
                    version,
                    MIN_DRIVER_MAJOR
                ),
                Some(_) => log::debug!("Driver version {}", version),
                None => log::warn!("Unrecognized driver version '{}'", version),
            }
        }
        Err(e) => log::debug!("Could not read driver version: {}", e),
    }
}

/// Run one supervisor per policy, each on its own thread
///
/// Instances share nothing but the factory and the shutdown token; one
/// GPU failing does not stop the others. Results are returned in policy
/// order.
pub fn run_isolated<F>(
    factory: &F,
    policies: Vec<Policy>,
    shutdown: &Shutdown,
) -> Vec<(DeviceSelector, Result<SupervisorOutcome>)>
where
    F: SessionFactory + Sync,
{
    std::thread::scope(|scope| {
        let handles: Vec<_> = policies
            .into_iter()
            .map(|policy| {
                let device = policy.device().clone();
                let supervisor = Supervisor::new(factory, policy, shutdown.clone());
                (device, scope.spawn(move || supervisor.run_supervised()))
            })
            .collect();

        handles
            .into_iter()
            .map(|(device, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                (device, result)
            })
            .collect()
    })
}

/// Summarize isolated results, failing if any instance failed
pub fn summarize(results: &[(DeviceSelector, Result<SupervisorOutcome>)]) -> Result<()> {
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    for (device, result) in results {
        match result {
            Ok(outcome) => log::info!(
                "{} stopped ({:?}, {} restarts)",
                device,
                outcome.exit,
                outcome.restarts
            ),
            Err(e) => log::error!("{} failed: {}", device, e),
        }
    }

    if failed > 0 {
        return Err(AppError::InstancesFailed {
            failed,
            total: results.len(),
        });
    }
    Ok(())
}
