#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the crime-pulse hotspot pipeline.
//!
//! Loads a TOML configuration, seeds the in-memory stores from the
//! configured incident and contact files, and runs the pipeline once,
//! as an escalation-only sweep, or on a fixed schedule.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use crime_pulse_alerts::LogNotifier;
use crime_pulse_alerts_models::ContactRecord;
use crime_pulse_incident_models::Incident;
use crime_pulse_pipeline::{Pipeline, PipelineConfig, PipelineStores};
use crime_pulse_storage::MemoryStorage;
use crime_pulse_zones::{ResolverConfig, ZoneLayerPaths, ZoneRegistry, ZoneResolver};
use serde::Deserialize;

/// Environment variable overriding the default configuration path.
const CONFIG_ENV: &str = "CRIME_PULSE_CONFIG";

#[derive(Parser)]
#[command(name = "crime_pulse_cli", about = "Crime hotspot detection and alerting pipeline")]
struct Cli {
    /// Path to the TOML configuration file
    /// (default: `crime-pulse.toml`, or `$CRIME_PULSE_CONFIG`)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full pipeline tick: enrich, cluster, forecast, escalate
    Run,
    /// Re-evaluate stored hotspots and forecasts for escalation without
    /// recomputing them
    Sweep,
    /// Run a full tick on a fixed interval until interrupted
    Schedule {
        /// Minutes between ticks
        #[arg(long, default_value = "60")]
        every: u64,
    },
    /// Load the configuration, zone layers, and data files, then exit
    ValidateConfig,
}

/// Top-level TOML configuration.
#[derive(Debug, Deserialize)]
struct AppConfig {
    /// `GeoJSON` files for the four zone layers.
    zones: ZoneLayerPaths,
    /// Seed files for the in-memory stores.
    data: DataPaths,
    /// Coordinate resolution settings.
    #[serde(default)]
    resolver: ResolverConfig,
    /// Pipeline orchestration settings.
    #[serde(default)]
    pipeline: PipelineConfig,
}

/// Input files the in-memory stores are seeded from.
#[derive(Debug, Deserialize)]
struct DataPaths {
    /// JSON array of incidents.
    incidents: PathBuf,
    /// JSON array of contact records.
    contacts: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("crime-pulse.toml"));

    log::info!("Loading configuration from {}", config_path.display());
    let config: AppConfig = toml::from_str(&std::fs::read_to_string(&config_path)?)?;

    match cli.command {
        Commands::ValidateConfig => {
            let _registry = ZoneRegistry::load(&config.zones)?;
            let (incidents, contacts) = load_data(&config.data)?;
            println!(
                "Configuration OK: {} incidents, {} contacts, zone layers loaded",
                incidents.len(),
                contacts.len()
            );
        }
        Commands::Run => {
            let pipeline = build_pipeline(&config).await?;
            let summary = pipeline.run_tick(Utc::now()).await?;
            println!("{summary}");
        }
        Commands::Sweep => {
            let pipeline = build_pipeline(&config).await?;
            let tally = pipeline.run_escalation_sweep(Utc::now()).await;
            println!(
                "{} candidates, {} escalated, {} cooled down, {} suppressed, {} failed",
                tally.candidates, tally.escalated, tally.cooled_down, tally.suppressed, tally.failed
            );
        }
        Commands::Schedule { every } => {
            let pipeline = build_pipeline(&config).await?;
            let interval = std::time::Duration::from_secs(every.max(1) * 60);
            log::info!("Scheduling a tick every {every} minute(s)");

            loop {
                match pipeline.run_tick(Utc::now()).await {
                    Ok(summary) => log::info!("{summary}"),
                    Err(e) => log::error!("Tick failed: {e}"),
                }
                tokio::time::sleep(interval).await;
            }
        }
    }

    Ok(())
}

/// Loads zone layers and seed data, then wires the pipeline together.
async fn build_pipeline(config: &AppConfig) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let registry = ZoneRegistry::load(&config.zones)?;
    let resolver = ZoneResolver::new(Arc::new(registry), config.resolver.clone());

    let (incidents, contacts) = load_data(&config.data)?;
    log::info!(
        "Seeding stores: {} incidents, {} contacts",
        incidents.len(),
        contacts.len()
    );

    let storage = Arc::new(MemoryStorage::new());
    storage.seed_incidents(incidents).await;
    storage.seed_contacts(contacts).await;

    let stores = PipelineStores {
        analytics: storage.clone(),
        alerts: storage.clone(),
        contacts: storage.clone(),
        incidents: storage,
    };

    Ok(Pipeline::new(
        resolver,
        stores,
        Arc::new(LogNotifier),
        config.pipeline.clone(),
    ))
}

/// Parses the incident and contact seed files.
fn load_data(
    data: &DataPaths,
) -> Result<(Vec<Incident>, Vec<ContactRecord>), Box<dyn std::error::Error>> {
    let incidents: Vec<Incident> =
        serde_json::from_str(&std::fs::read_to_string(&data.incidents)?)?;
    let contacts: Vec<ContactRecord> =
        serde_json::from_str(&std::fs::read_to_string(&data.contacts)?)?;
    Ok((incidents, contacts))
}
