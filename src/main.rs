//! CLI Entry Point for triggered-daq
//!
//! Runs one acquisition against a simulated instrument described by the configuration
//! file, prints per-channel statistics and optionally writes the dataset as JSON.
//!
//! # Usage
//!
//! ```bash
//! triggered-daq --config config/acquisition.toml analog
//! triggered-daq digital --output capture.json
//! triggered-daq show-config
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use triggered_daq::codec::SampleValue;
use triggered_daq::config::{DaqConfig, DEFAULT_CONFIG_PATH};
use triggered_daq::instrument::ChannelKind;
use triggered_daq::task::AcquisitionTask;
use triggered_daq::trigger::TriggerSource;
use triggered_daq::{tracing_setup, AcquiredDataset};

#[derive(Parser)]
#[command(name = "triggered-daq")]
#[command(about = "Triggered streaming acquisition against simulated instruments")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Write the dataset as JSON to this file
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire analog channels
    Analog,
    /// Acquire digital lines
    Digital,
    /// Print the resolved configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = DaqConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing_setup::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Analog => {
            config.acquisition.kind = ChannelKind::Analog;
            run_analog(&config, cli.output.as_deref()).await
        }
        Commands::Digital => {
            config.acquisition.kind = ChannelKind::Digital;
            run_digital(&config, cli.output.as_deref()).await
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_analog(config: &DaqConfig, output: Option<&Path>) -> Result<()> {
    let request = config.analog_request()?;
    let triggered = !matches!(request.trigger().source, TriggerSource::Disabled);
    let total = request.target_samples(request.sample_rate());
    let instrument = config.simulator.analog_instrument(total, triggered);

    info!(
        app = %config.application.name,
        channels = ?request.channels(),
        sample_rate = request.sample_rate(),
        "Starting analog acquisition"
    );
    let task = AcquisitionTask::spawn(instrument, request, config.acquire_options());
    let outcome = task.join().await?;
    let dataset = outcome.result?;

    report(&dataset, output).await
}

async fn run_digital(config: &DaqConfig, output: Option<&Path>) -> Result<()> {
    let request = config.digital_request()?;
    let triggered = !matches!(request.trigger().source, TriggerSource::Disabled);
    let total = request.target_samples(request.sample_rate());
    let instrument = config.simulator.digital_instrument(total, triggered);

    info!(
        app = %config.application.name,
        channels = ?request.channels(),
        sample_rate = request.sample_rate(),
        "Starting digital acquisition"
    );
    let task = AcquisitionTask::spawn(instrument, request, config.acquire_options());
    let outcome = task.join().await?;
    let dataset = outcome.result?;

    report(&dataset, output).await
}

async fn report<T>(dataset: &AcquiredDataset<T>, output: Option<&Path>) -> Result<()>
where
    T: SampleValue + Serialize,
{
    println!(
        "{} acquisition {}: {} samples at {} Hz, triggered={}, valid={}",
        dataset.kind(),
        dataset.id(),
        dataset.len(),
        dataset.sample_rate_actual(),
        dataset.triggered(),
        dataset.is_valid()
    );
    let totals = dataset.totals();
    println!(
        "  seen={} lost={} corrupted={} pre-trigger={}",
        totals.seen,
        totals.lost,
        totals.corrupted,
        dataset.pre_trigger_samples()
    );
    for summary in dataset.summary() {
        println!(
            "  {}: mean={:.4} std={:.4} ({} samples, {} placeholders)",
            summary.name, summary.mean, summary.std_dev, summary.samples, summary.placeholders
        );
    }
    for warning in dataset.warnings() {
        println!("  warning: {}", warning);
    }

    if let Some(path) = output {
        let json = serde_json::to_vec_pretty(dataset)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Dataset written to {}", path.display());
    }
    Ok(())
}
