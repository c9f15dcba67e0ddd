use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use hsperf_measurement::{MeasurementConfig, Orchestrator, Shutdown};

/// Measure hidden-service performance with a matched traffic-generator pair
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the anonymity-service (tor) executable
    #[arg(long, value_name = "PATH")]
    tor: Option<PathBuf>,

    /// Path to the traffic-generator (tgen) executable
    #[arg(long, value_name = "PATH")]
    tgen: Option<PathBuf>,

    /// Transfers per burst
    #[arg(long, value_name = "N")]
    burst_count: Option<u32>,

    /// Pause after each burst, in seconds
    #[arg(long, value_name = "SECONDS")]
    burst_interval: Option<u64>,

    /// Working directory for configs, logs and service data
    #[arg(long, value_name = "DIR")]
    prefix: Option<PathBuf>,

    /// Configuration file path (YAML); arguments above override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn into_config(self) -> Result<MeasurementConfig> {
        let mut config = match &self.config {
            Some(path) => MeasurementConfig::load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => MeasurementConfig::default(),
        };

        if let Some(tor) = self.tor {
            config.tor_path = tor;
        }
        if let Some(tgen) = self.tgen {
            config.tgen_path = tgen;
        }
        if let Some(count) = self.burst_count {
            config.burst.count = count;
        }
        if let Some(secs) = self.burst_interval {
            config.burst.interval = Duration::from_secs(secs);
        }
        if let Some(prefix) = self.prefix {
            config.prefix = prefix;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    initialize_logging(args.debug);

    info!("Starting hsperf {}", hsperf_measurement::VERSION);
    let config = args.into_config()?;
    info!(
        tor = %config.tor_path.display(),
        tgen = %config.tgen_path.display(),
        prefix = %config.prefix.display(),
        burst_count = config.burst.count,
        burst_interval = ?config.burst.interval,
        "Configuration loaded"
    );

    let orchestrator = Orchestrator::new(config).context("Invalid configuration")?;

    // Children run in their own process groups, so only this process sees
    // the terminal interrupt and it stops them itself.
    setup_signal_handlers(orchestrator.shutdown_handle())?;

    match orchestrator.run().await {
        Ok(()) => {
            info!("Measurement finished");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Measurement failed");
            Err(anyhow::anyhow!("Measurement failed: {}", e))
        }
    }
}

fn initialize_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}

fn setup_signal_handlers(shutdown: Shutdown) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM signal"),
                    _ = sigint.recv() => info!("Received SIGINT signal"),
                }
                if shutdown.is_set() {
                    warn!("Shutdown already in progress");
                } else {
                    shutdown.signal_shutdown();
                }
            }
        });
    }

    #[cfg(windows)]
    {
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    break;
                }
                info!("Received Ctrl+C signal");
                shutdown.signal_shutdown();
            }
        });
    }

    Ok(())
}
