//! List command implementation
//!
//! Lists all detected NVIDIA GPUs.

use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, GpuList, GpuListEntry};
use crate::commands::with_session;
use crate::error::Result;
use crate::nvml::{GpuManager, SessionFactory};

/// Describe every GPU visible to the session
pub fn collect_gpu_list<M: GpuManager>(session: &M) -> Result<GpuList> {
    let driver_version = session.driver_version()?;
    let gpus = session
        .list_devices()?
        .iter()
        .map(GpuListEntry::from)
        .collect();

    Ok(GpuList {
        gpus,
        driver_version,
    })
}

/// Execute the list command
pub fn run_list<F: SessionFactory>(factory: &F, format: OutputFormat) -> Result<()> {
    let gpu_list = with_session(factory, |session| collect_gpu_list(session))?;
    print_output(&gpu_list, format)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockGpu};
    use crate::nvml::SessionFactory;

    #[test]
    fn test_collect_gpu_list() {
        let backend = MockBackend::new(vec![
            MockGpu::new(0).with_name("RTX 4090").with_fan_count(3),
            MockGpu::new(1).with_uuid("GPU-abcd"),
        ])
        .with_driver_version("550.54.14");

        let list = with_session(&backend, |session| collect_gpu_list(session)).unwrap();

        assert_eq!(list.driver_version, "550.54.14");
        assert_eq!(list.gpus.len(), 2);
        assert_eq!(list.gpus[0].name, "RTX 4090");
        assert_eq!(list.gpus[0].fans, 3);
        assert_eq!(list.gpus[1].uuid, "GPU-abcd");
        assert_eq!(backend.closes(), 1);
    }

    #[test]
    fn test_empty_system_lists_nothing() {
        let backend = MockBackend::new(Vec::new());
        let mut session = backend.open().unwrap();
        let list = collect_gpu_list(&session).unwrap();
        assert!(list.gpus.is_empty());
        session.close().unwrap();
    }
}
