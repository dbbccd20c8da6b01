//! nvgov - NVML-based GPU governor
//!
//! A command-line tool that holds NVIDIA GPU fan speeds, power limits, and
//! acoustic temperature thresholds at configured targets.

use clap::Parser;
use nvgov::cli::args::{generate_completions, Cli, Commands, ControlArgs};
use nvgov::commands::{run_control, run_fan, run_info, run_list};
use nvgov::config::{Config, ConfigBuilder};
use nvgov::error::{AppError, DomainError, NvmlError};
use nvgov::nvml::NvmlSessionFactory;
use nvgov::services::Shutdown;

fn main() {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        generate_completions(*shell);
        return;
    }

    init_logging(&cli);

    if let Err(e) = run(&cli) {
        log::error!("{}", e);
        print_error(&e);
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let controlling = matches!(cli.command, Commands::Control(_));
    let default_filter = match (cli.verbose, controlling) {
        (true, _) => "debug",
        (false, true) => "info",
        (false, false) => "warn",
    };

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    if controlling {
        builder.format_timestamp_secs();
    } else {
        builder.format_timestamp(None);
    }
    builder.init();
}

fn run(cli: &Cli) -> Result<(), AppError> {
    let factory = NvmlSessionFactory;
    let selector = cli.selector();

    match &cli.command {
        Commands::List => run_list(&factory, cli.format),

        Commands::Info(args) => run_info(&factory, args, selector.as_ref(), cli.format),

        Commands::Fan(args) => run_fan(&factory, args, selector.as_ref(), cli.dry_run, cli.format),

        Commands::Control(args) => {
            let config = control_config(cli, args)?;
            let shutdown = Shutdown::new();

            let handler = shutdown.clone();
            if let Err(e) = ctrlc::set_handler(move || {
                log::info!("Received shutdown signal, stopping...");
                handler.trigger();
            }) {
                log::warn!(
                    "Failed to set signal handler: {}. Ctrl+C will not stop the loop cleanly.",
                    e
                );
            }

            run_control(&factory, &config, &shutdown, cli.format)
        }

        Commands::Completions { shell } => {
            generate_completions(*shell);
            Ok(())
        }
    }
}

/// Merge the configuration file with the control command's flags
fn control_config(cli: &Cli, args: &ControlArgs) -> Result<Config, AppError> {
    let config = ConfigBuilder::new()
        .with_file(cli.config.as_deref())?
        .with_dry_run(cli.dry_run.then_some(true))
        .with_interval(args.interval)
        .with_retry_interval(args.retry_interval)
        .with_retry(args.no_retry.then_some(false))
        .with_single_use(args.single_use.then_some(true))
        .with_gpu(cli.gpu, cli.gpu_name.clone(), cli.gpu_uuid.clone())
        .with_fan_curve(args.curve_points()?, args.default_speed)
        .with_power_limit(args.power_limit)
        .with_acoustic_limit(args.acoustic_limit)
        .build();

    log::debug!("Effective configuration: {:?}", config);
    Ok(config)
}

fn print_error(err: &AppError) {
    eprintln!("Error: {}", err);

    // Print helpful hints for common errors
    match err {
        AppError::Nvml(NvmlError::LibraryNotFound) => {
            eprintln!();
            eprintln!("Hint: Make sure the NVIDIA driver is installed.");
            eprintln!("      On Linux, install the nvidia-utils package.");
        }
        AppError::Nvml(NvmlError::InsufficientPermissions(_)) => {
            eprintln!();
            eprintln!("Hint: Try running with sudo or as root.");
        }
        AppError::NoGpusFound => {
            eprintln!();
            eprintln!("Hint: Make sure you have an NVIDIA GPU installed.");
            eprintln!("      Check 'nvidia-smi' for GPU detection.");
        }
        AppError::Domain(DomainError::NoActiveDomain) => {
            eprintln!();
            eprintln!("Hint: Pass --speed-pair, --power-limit or --acoustic-limit,");
            eprintln!("      or set them in the configuration file.");
        }
        _ => {}
    }
}
