//! Fan command implementation
//!
//! Handles fan status and policy commands.

use crate::cli::args::{FanArgs, FanCommands, OutputFormat};
use crate::cli::output::{print_output, FanInfo, FanStatus, Message};
use crate::commands::info::{collect_reports, Sections};
use crate::commands::{target_devices, with_session};
use crate::domain::{DeviceSelector, FanPolicy};
use crate::error::{NvmlError, Result};
use crate::nvml::{GpuDevice, SessionFactory};
use crate::services::fan_service::{read_fan_state, set_fan_policy};

/// Execute fan commands
pub fn run_fan<F: SessionFactory>(
    factory: &F,
    args: &FanArgs,
    selector: Option<&DeviceSelector>,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    match &args.command {
        FanCommands::Status => {
            let sections = Sections {
                fan: true,
                power: false,
                thermal: false,
            };
            for report in collect_reports(factory, selector, sections)? {
                print_output(&report, format)?;
            }
        }
        FanCommands::Policy { policy } => {
            for message in apply_fan_policy(factory, selector, (*policy).into(), dry_run)? {
                print_output(&message, format)?;
            }
        }
    }
    Ok(())
}

/// Read the fan section of a report
pub fn read_fan_status<D: GpuDevice>(
    device: &D,
) -> std::result::Result<FanStatus, NvmlError> {
    let state = read_fan_state(device)?;

    let fans = state
        .per_controller
        .iter()
        .zip(0u32..)
        .map(|(speed, index)| FanInfo {
            index,
            speed: speed.as_percentage(),
            policy: device
                .fan_policy(index)
                .map(|p| p.to_string())
                .unwrap_or_else(|_| "Unknown".to_string()),
        })
        .collect();

    let status = FanStatus {
        aggregate_speed: state.aggregate.as_percentage(),
        min_speed: None,
        max_speed: None,
        fans,
    };
    Ok(status.with_constraints(state.constraints))
}

/// Set the fan control policy on every targeted GPU
pub fn apply_fan_policy<F: SessionFactory>(
    factory: &F,
    selector: Option<&DeviceSelector>,
    policy: FanPolicy,
    dry_run: bool,
) -> Result<Vec<Message>> {
    with_session(factory, |session| {
        let mut messages = Vec::new();

        for mut device in target_devices(session, selector)? {
            let name = device.name()?;
            let count = set_fan_policy(&mut device, policy, dry_run)?;

            let message = if dry_run {
                format!(
                    "[DRY RUN] Would set {} fan controllers to {} on GPU {} ({})",
                    count,
                    policy,
                    device.index(),
                    name
                )
            } else {
                format!(
                    "Set {} fan controllers to {} on GPU {} ({})",
                    count,
                    policy,
                    device.index(),
                    name
                )
            };

            messages.push(Message {
                message,
                success: true,
            });
        }

        Ok(messages)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockGpu, Mutation, Op};

    #[test]
    fn test_apply_fan_policy() {
        let backend = MockBackend::new(vec![MockGpu::new(0), MockGpu::new(1).with_fan_count(1)]);

        let messages = apply_fan_policy(&backend, None, FanPolicy::Manual, false).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].message.starts_with("Set 1 fan controllers"));

        let mutations = backend.mutations();
        assert_eq!(mutations.len(), 3);
        assert!(mutations.contains(&Mutation::FanPolicy {
            gpu: 1,
            fan: 0,
            policy: FanPolicy::Manual
        }));
        assert_eq!(backend.opens(), backend.closes());
    }

    #[test]
    fn test_apply_fan_policy_dry_run() {
        let backend = MockBackend::with_gpus(1);

        let messages =
            apply_fan_policy(&backend, Some(&DeviceSelector::Index(0)), FanPolicy::Auto, true)
                .unwrap();
        assert!(messages[0].message.starts_with("[DRY RUN]"));
        assert!(backend.mutations().is_empty());
    }

    #[test]
    fn test_fan_status_without_constraints() {
        let backend = MockBackend::new(vec![MockGpu::new(0)
            .unsupported(Op::FanConstraints)
            .unsupported(Op::FanPolicy)]);

        let status = with_session(&backend, |session| {
            let devices = target_devices(session, None)?;
            Ok(read_fan_status(&devices[0])?)
        })
        .unwrap();

        assert_eq!(status.min_speed, None);
        assert_eq!(status.fans.len(), 2);
        assert_eq!(status.fans[1].policy, "Unknown");
    }
}
