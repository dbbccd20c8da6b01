//! Info command implementation
//!
//! Shows GPU temperature, fan, power, and acoustic threshold state.

use crate::cli::args::{InfoArgs, OutputFormat};
use crate::cli::output::{print_output, AcousticStatus, GpuReport, PowerStatus, Section};
use crate::commands::fan::read_fan_status;
use crate::commands::{target_devices, with_session};
use crate::domain::DeviceSelector;
use crate::error::{NvmlError, Result};
use crate::nvml::{GpuDevice, SessionFactory};
use crate::services::power_service::read_power_state;

/// Sections an info report includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sections {
    pub fan: bool,
    pub power: bool,
    pub thermal: bool,
}

impl From<&InfoArgs> for Sections {
    fn from(args: &InfoArgs) -> Self {
        let (fan, power, thermal) = args.sections();
        Self {
            fan,
            power,
            thermal,
        }
    }
}

/// Execute the info command
pub fn run_info<F: SessionFactory>(
    factory: &F,
    args: &InfoArgs,
    selector: Option<&DeviceSelector>,
    format: OutputFormat,
) -> Result<()> {
    let reports = collect_reports(factory, selector, Sections::from(args))?;
    for report in &reports {
        print_output(report, format)?;
    }
    Ok(())
}

/// Build a report for every targeted GPU
pub fn collect_reports<F: SessionFactory>(
    factory: &F,
    selector: Option<&DeviceSelector>,
    sections: Sections,
) -> Result<Vec<GpuReport>> {
    with_session(factory, |session| {
        target_devices(session, selector)?
            .iter()
            .map(|device| Ok(gpu_report(device, sections)?))
            .collect()
    })
}

/// Read one GPU's state
///
/// A section the device does not support is marked as such; any other read
/// failure fails the report.
pub fn gpu_report<D: GpuDevice>(
    device: &D,
    sections: Sections,
) -> std::result::Result<GpuReport, NvmlError> {
    let info = device.info()?;

    Ok(GpuReport {
        index: info.index,
        name: info.name,
        uuid: info.uuid,
        temperature: device.temperature()?.as_celsius(),
        fan: section(sections.fan, || read_fan_status(device))?,
        power: section(sections.power, || {
            let state = read_power_state(device)?;
            Ok(PowerStatus::new(
                state.current,
                state.enforced,
                state.constraints,
            ))
        })?,
        thermal: section(sections.thermal, || {
            device.acoustic_limits().map(AcousticStatus::from)
        })?,
    })
}

fn section<T>(
    requested: bool,
    read: impl FnOnce() -> std::result::Result<T, NvmlError>,
) -> std::result::Result<Section<T>, NvmlError> {
    if !requested {
        return Ok(Section::Skipped);
    }

    match read() {
        Ok(value) => Ok(Section::Shown(value)),
        Err(e) if e.is_unsupported() => {
            log::debug!("Skipping unsupported section: {}", e);
            Ok(Section::Unsupported)
        }
        Err(e) => Err(e),
    }
}
