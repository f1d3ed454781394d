//! # fanctl
//!
//! Closed-loop fan controller daemon.
//!
//! ## Commands
//! - **run:** select the temperature source, start the PWM actuator and tick the
//!   PID loop until SIGINT/SIGTERM.
//! - **check-source:** build the configured primary source (no fallback), read it
//!   once and print the temperature and the round-trip time.
//!
//! Logging goes through `env_logger` (`RUST_LOG`, default `info`).

use std::{path::{Path, PathBuf}, process::ExitCode, sync::Arc, time::Instant};

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use fanctl::{
    FanConfig, GaugeBoard, LogSink, ReadTemperature, SourceSelector, Telemetry,
    config::DEFAULT_CONFIG_PATH,
    control::monitor::{DUTY_CYCLE_GAUGE, TEMPERATURE_GAUGE},
    run_monitor,
};

#[derive(Debug, Parser)]
#[command(name = "fanctl", version, about = "PID fan controller")]
struct Cli {
    /// YAML configuration file.
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the control loop until interrupted.
    Run,
    /// Read the primary temperature source once.
    CheckSource,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run => run(&cli.config).await,
        Command::CheckSource => check_source(&cli.config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(path: &Path) -> CliResult {
    let config = FanConfig::load(path)?;
    info!("=== FANCTL START === config {}", path.display());

    let mut source = SourceSelector::build(config.source_config()).await?;

    let gauges = GaugeBoard::new();
    let telemetry = Telemetry::disabled()
        .with_sink(Arc::new(LogSink))
        .with_sink(Arc::new(gauges.clone()));

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone())?;

    let outcome = run_monitor(&config.monitor_config(), &mut source, &telemetry, cancel).await;
    source.close();
    let stats = outcome?;

    let last = |name: &str| {
        gauges
            .latest(name)
            .map_or_else(|| "n/a".to_string(), |v| format!("{:.1}", v))
    };
    info!(
        "=== FANCTL STOP === {} ticks, {} skipped, {} overruns; last {}°C at {}%",
        stats.ticks,
        stats.skipped_reads,
        stats.overruns,
        last(TEMPERATURE_GAUGE),
        last(DUTY_CYCLE_GAUGE)
    );
    Ok(())
}

async fn check_source(path: &Path) -> CliResult {
    let config = FanConfig::load(path)?;
    let mut source = SourceSelector::build_primary(config.source_config())?;
    println!("Checking {}", source.describe());

    let started = Instant::now();
    let reading = source.read().await;
    let elapsed = started.elapsed();
    source.close();

    let temperature = reading?;
    println!("Temperature: {:.2}°C (took {:?})", temperature, elapsed);
    Ok(())
}

/// Cancels `cancel` on the first SIGINT or SIGTERM.
fn spawn_signal_listener(cancel: CancellationToken) -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!("failed to listen for SIGINT: {}", e);
                    return;
                }
                info!("SIGINT received, shutting down");
            }
            _ = terminate.recv() => info!("SIGTERM received, shutting down"),
        }
        cancel.cancel();
    });
    Ok(())
}
