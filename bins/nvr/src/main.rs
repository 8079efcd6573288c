use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use nvr_log_collection::SanitizingLogSink;
use nvr_recorder::{Recorder, RecorderConfig};

/// Application log file name under the log root
const APP_LOG_FILE: &str = "nvr.log";

/// NVR - supervised camera capture with tiered retention
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE", env = "NVR_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Run duration in seconds (for testing)
    #[arg(long)]
    run_duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first; the log root comes from it
    let config = RecorderConfig::load_from_file(&args.config)?;

    initialize_logging(args.debug, &config.settings.log_root)?;

    info!("Starting NVR recorder v{}", nvr_recorder::VERSION);
    info!("Config file: {}", args.config.display());
    if let Some(ref overlay) = config.overlay {
        info!("Applied config overlay: {}", overlay.display());
    }
    for (key, value) in config.diagnostic_view() {
        info!("config {} = {}", key, value);
    }

    let recorder = Recorder::start(&config);

    if let Some(duration) = args.run_duration {
        info!("Running for {} seconds (test mode)", duration);
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(duration)) => {}
            res = shutdown_signal() => res?,
        }
    } else {
        shutdown_signal().await?;
    }

    info!("Shutting down recorder...");
    let summary = recorder.shutdown().await;
    for (source, outcome) in &summary.outcomes {
        info!("Camera {} finished: {:?}", source, outcome);
    }
    if !summary.crashed.is_empty() {
        anyhow::bail!("Units did not shut down cleanly: {}", summary.crashed.join(", "));
    }

    info!("Recorder shut down successfully");
    Ok(())
}

/// Console and `<log_root>/nvr.log`, both sanitized before anything is written.
fn initialize_logging(debug: bool, log_root: &Path) -> Result<()> {
    let level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_path = log_root.join(APP_LOG_FILE);
    let file_sink = SanitizingLogSink::file(&log_path)
        .with_context(|| format!("Failed to open application log {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(SanitizingLogSink::stderr()),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_sink),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C signal");
    }

    Ok(())
}
