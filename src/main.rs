//! AIR bulk transmitter binary.
//!
//! Run with: `aca-air-transmitter --config config.yaml`

use aca_air_transmitter::{SigningIdentity, Transmitter, TransmitterConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// ACA AIR bulk transmitter.
///
/// Builds, signs, and submits the configured transmission scenarios in
/// order, one request per scenario, reporting the raw endpoint response.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!(
        "Starting ACA AIR transmitter v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Config file: {}", args.config.display());

    let content = tokio::fs::read_to_string(&args.config)
        .await
        .context("Failed to read config file")?;
    let config: TransmitterConfig =
        serde_yaml::from_str(&content).context("Failed to parse config file")?;

    if config.scenarios.is_empty() {
        anyhow::bail!("No scenarios configured; nothing to transmit");
    }

    info!(
        endpoint = %config.submission_endpoint,
        profile = ?config.profile,
        scenarios = config.scenarios.len(),
        "Configuration loaded"
    );

    let identity = SigningIdentity::load(
        &config.certificate_path,
        &config.private_key_path,
        config.private_key_password.as_deref(),
    )
    .context("Failed to load signing identity")?;

    let transmitter =
        Transmitter::new(config.clone(), identity).context("Failed to initialize transmitter")?;

    let mut failures = 0usize;
    for scenario in &config.scenarios {
        info!(scenario = %scenario.name, "Transmitting");
        match transmitter.transmit(scenario).await {
            Ok(receipt) => {
                info!(
                    scenario = %scenario.name,
                    status = receipt.status,
                    "Transmission accepted"
                );
                println!("=== {} (HTTP {}) ===", scenario.name, receipt.status);
                println!("{}", receipt.body);
            }
            Err(e) => {
                failures += 1;
                error!(
                    scenario = %scenario.name,
                    stage = e.stage(),
                    error = %e,
                    "Transmission failed"
                );
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} transmission(s) failed");
    }

    info!("All transmissions complete");
    Ok(())
}
