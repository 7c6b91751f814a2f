//! Roam Timing Tester - Main CLI Application
//!
//! Ramps RF attenuation between access-point groups, waits for every station
//! to roam and reports the roam latency measured from packet captures.

use clap::Parser;
use roam_timing_tester::{
    attenuator::AttenuationController,
    capture::{CaptureSession, MonitorSetup, TsharkSniffer},
    cli::Cli,
    client::ManagerClient,
    config::{display_config_summary, load_config, validate_config, EnvManager},
    defaults,
    engine::{EngineSettings, RoamIterationEngine, RoamTest, RunReport},
    error::{AppError, ErrorReporter, Result},
    log_debug, log_info, log_warn,
    logging::LoggerFactory,
    output::{OutputCoordinator, OutputFormatterFactory, ReportMetadata, ReportWriter},
    station::StationObserver,
    utils::BoundedPoll,
    PKG_NAME, VERSION,
};
use std::error::Error;
use std::path::Path;
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Exit status of a completed run in which at least one roam failed
const EXIT_ROAM_FAILURES: i32 = 6;

#[tokio::main]
async fn main() {
    // no exit here: unwinding drops the sniffer, which kills the capture
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        eprintln!("Application panic: {}", panic_info);
        eprintln!("Attenuators may be left at their last commanded values.");
        default_hook(panic_info);
    }));

    let cli = Cli::parse();
    let reporter = ErrorReporter::new(cli.use_colors(), cli.verbose || cli.debug);

    match run_application(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            reporter.report_error(&e);

            if let Some(source) = e.source() {
                eprintln!("Caused by: {}", source);
            }

            print_error_suggestions(&e);

            process::exit(e.exit_code());
        }
    }
}

/// Main application logic; returns the process exit status
async fn run_application(cli: Cli) -> Result<i32> {
    if cli.is_info_only() {
        if cli.env_help {
            println!("{}", EnvManager::display_env_help());
        }
        if let Some(ref path) = cli.write_env_example {
            EnvManager::save_example_env_file(Path::new(path))?;
            println!("Example configuration written to {}", path);
        }
        return Ok(0);
    }

    if cli.debug {
        eprintln!("{} v{}", PKG_NAME, VERSION);
        eprintln!("Debug mode enabled");
        eprint!("{}", cli.get_config_summary());
        eprintln!();
    }

    if cli.verbose || cli.debug {
        if let Some(problems) = EnvManager::check_env_file()? {
            for problem in problems {
                eprintln!(".env: {}", problem);
            }
        }
        for warning in EnvManager::validate_current_env()? {
            eprintln!("{}", warning);
        }
    }

    let config = load_config(cli)?;

    for warning in validate_config(&config)? {
        eprintln!("{}", warning.format(config.enable_color));
    }

    if config.debug {
        eprintln!("Configuration loaded successfully:");
        for line in display_config_summary(&config).lines() {
            eprintln!("  {}", line);
        }
        eprintln!();
    }

    let client = Arc::new(ManagerClient::new(&config.manager_url, config.query_timeout())?);

    let monitor: Arc<dyn MonitorSetup> = client.clone();
    let sniffer = Arc::new(TsharkSniffer::new(config.sniff_radio.clone(), Some(monitor)));
    let capture = CaptureSession::new(
        sniffer,
        config.capture_dir.clone(),
        BoundedPoll::new(defaults::DEFAULT_SNIFFER_STOP_ATTEMPTS, defaults::DEFAULT_SNIFFER_STOP_INTERVAL),
    );

    let observer = StationObserver::new(client.clone(), config.query_timeout());
    let controller = AttenuationController::new(
        client.clone(),
        config.attenuator_groups.clone(),
        config.step,
        config.max_attenuation,
    )?;
    let settings = EngineSettings::from_config(&config)?;

    let loggers = LoggerFactory::new(config.clone());
    let logger = loggers.create_logger("MAIN").await;
    logger.add_context_field("manager".to_string(), config.manager_url.clone()).await;
    log_debug!(logger, "Captures are written under {}", config.capture_dir.display());
    let engine = RoamIterationEngine::new(
        controller,
        observer,
        client,
        capture,
        config.bssids.clone(),
        settings,
        loggers.create_roam_logger().await,
    );
    let mut test = RoamTest::new(engine, &config)?;

    let cancel = test.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received, stopping after the current iteration...");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    log_info!(
        logger,
        "Starting {} iterations over {} groups with {} stations",
        config.iterations,
        config.attenuator_groups.len(),
        config.stations.len()
    );

    let report = match test.run().await {
        Ok(report) => report,
        Err(e) => {
            loggers.create_error_logger().log_error(&e, Some("roam run"), None).await;
            return Err(e);
        }
    };

    for (iteration, reason) in &report.aborted_iterations {
        log_warn!(logger, "Iteration {} was aborted: {}", iteration, reason);
    }
    if report.cancelled {
        log_warn!(
            logger,
            "Run cancelled after {} of {} iterations",
            report.iterations_completed,
            report.iterations_requested
        );
    }

    let metadata = ReportMetadata::from_config(&config);
    let path = ReportWriter::new(&config.output_dir).write(&report, &metadata).await?;

    let coordinator = OutputCoordinator::new(OutputFormatterFactory::create_formatter(&config));
    let output = if config.json_output {
        coordinator.display_json(&report, &metadata)?
    } else {
        coordinator.display_report(&report, &metadata)?
    };
    println!("{}", output);

    log_info!(logger, "Report written to {}", path.display());

    Ok(exit_status(&report))
}

fn exit_status(report: &RunReport) -> i32 {
    if report.cancelled {
        AppError::cancelled("interrupted").exit_code()
    } else if report.all_passed() {
        0
    } else {
        EXIT_ROAM_FAILURES
    }
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) | AppError::Validation(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Pass one --group per access point, e.g. --group 1.1.3034.0,1.1.3034.1");
            eprintln!("  - Give one --bssids entry per group, in the same order");
            eprintln!("  - Station ids look like 1.1.sta0000");
            eprintln!("  - Run with --env-help to list the ROAM_* variables");
        }
        AppError::Http(_) | AppError::Telemetry(_) => {
            eprintln!();
            eprintln!("Test manager troubleshooting:");
            eprintln!("  - Check the --manager-url and that the JSON API answers");
            eprintln!("  - Verify the listed stations exist on the manager");
            eprintln!("  - Increase --query-timeout on a busy manager");
        }
        AppError::Hardware(_) => {
            eprintln!();
            eprintln!("Attenuator troubleshooting:");
            eprintln!("  - Check the attenuator serial and module indexes");
            eprintln!("  - Keep --max-attenuation within the attenuator range");
        }
        AppError::Capture(_) | AppError::Io(_) => {
            eprintln!();
            eprintln!("Capture troubleshooting:");
            eprintln!("  - Make sure tshark is installed and may capture on the monitor interface");
            eprintln!("  - Check that the capture and output directories are writable");
        }
        _ => {}
    }
}
