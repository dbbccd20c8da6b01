//! Command handlers
//!
//! Each command handler orchestrates the execution of a CLI command. Handlers
//! take a `SessionFactory` so they run the same against NVML and the mock
//! backend.

pub mod control;
pub mod fan;
pub mod info;
pub mod list;

pub use control::run_control;
pub use fan::run_fan;
pub use info::run_info;
pub use list::run_list;

use crate::domain::DeviceSelector;
use crate::error::{AppError, Result};
use crate::nvml::{GpuManager, SessionFactory};
use crate::services::supervisor::finish;

/// Open a session, run `f` against it, and close it whatever `f` returns
pub fn with_session<F, T>(factory: &F, f: impl FnOnce(&F::Session) -> Result<T>) -> Result<T>
where
    F: SessionFactory,
{
    let mut session = factory.open()?;
    let result = f(&session);
    finish(&mut session, result)
}

/// Resolve the devices a command acts on
///
/// Without a selector every device is targeted; a system with none is an
/// error.
pub fn target_devices<'s, M: GpuManager>(
    session: &'s M,
    selector: Option<&DeviceSelector>,
) -> Result<Vec<M::Device<'s>>> {
    if let Some(selector) = selector {
        return Ok(vec![session.resolve(selector)?]);
    }

    let count = session.device_count()?;
    if count == 0 {
        return Err(AppError::NoGpusFound);
    }

    (0..count)
        .map(|index| Ok(session.device_by_index(index)?))
        .collect()
}
