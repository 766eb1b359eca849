//! CLI entry point for daq-actors
//!
//! Provides a command-line interface for:
//! - Running the speaker/listener demo
//! - Inspecting a saved state snapshot
//! - Printing the effective configuration
//!
//! # Usage
//!
//! Run the demo for three seconds and keep its state:
//! ```bash
//! daq-actors demo --seconds 3 --snapshot data/demo-state.json
//! ```
//!
//! Inspect a snapshot:
//! ```bash
//! daq-actors inspect data/demo-state.json
//! ```
//!
//! Show the configuration after file and `DAQ_ACTORS_*` overrides:
//! ```bash
//! daq-actors config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_actors::config::RuntimeConfig;
use daq_actors::data::storage::{SaveContext, UserExtras};
use daq_actors::data::storage_factory::{save_in_background, SaverRegistry};
use daq_actors::data::{DataPoint, RunData};
use daq_actors::demo::{Listener, Speaker};
use daq_actors::metadata::RunMetadata;
use daq_actors::state::{load_snapshot, save_snapshot};
use daq_actors::supervisor::{Supervisor, SupervisorSettings};
use daq_actors::{logging, ShutdownReport};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "daq-actors")]
#[command(about = "Actor runtime for data acquisition", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = daq_actors::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a speaker greeting a listener, then shut both down
    Demo {
        /// How long to let the actors run
        #[arg(long, default_value = "3")]
        seconds: u64,

        /// Write the collected state snapshot here
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Save the run with the configured saver
        #[arg(long)]
        save: bool,
    },

    /// Print a summary of a saved snapshot
    Inspect {
        /// Path to a snapshot file
        path: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RuntimeConfig::load_from(&cli.config)?;
    config.validate()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Demo {
            seconds,
            snapshot,
            save,
        } => run_demo(&config, seconds, snapshot, save).await,
        Commands::Inspect { path } => inspect(&path),
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_demo(
    config: &RuntimeConfig,
    seconds: u64,
    snapshot_path: Option<PathBuf>,
    save: bool,
) -> Result<()> {
    let metadata = RunMetadata::builder()
        .experiment_name("speaker-listener demo")
        .parameter("seconds", json!(seconds))
        .build();
    metadata.validate().map_err(anyhow::Error::msg)?;

    let mut supervisor = Supervisor::builder()
        .settings(SupervisorSettings::from_config(config))
        .actor("speaks", Speaker::new("listens", Duration::from_millis(500)))
        .actor("listens", Listener::new())
        .build()?;

    supervisor.start().await?;
    info!(seconds, "Demo running");
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    let report = supervisor.stop().await;
    print_report(&report);

    let snapshot = supervisor.collect_state().await;
    if let Some(path) = snapshot_path {
        save_snapshot(&snapshot, &path)?;
        println!("Snapshot written to {}", path.display());
    }

    if save {
        let heard = snapshot
            .get("listens")
            .and_then(|state| state.as_value()["received"].as_array().map(Vec::len))
            .unwrap_or(0);
        let mut data = RunData::new();
        data.push(DataPoint::new("greetings", heard as f64, "count"));

        let saver = SaverRegistry::new().create(&config.storage.default_format)?;
        let ctx = SaveContext::new(config.storage.output_dir.join(metadata.run_id.to_string()));
        let extras = UserExtras::from([(
            "snapshot".to_string(),
            Some(serde_json::to_value(&snapshot)?),
        )]);
        let directory = ctx.save_directory.clone();
        save_in_background(saver, metadata, data, extras, ctx)
            .wait()
            .await?;
        println!("Run saved to {}", directory.display());
    }

    Ok(())
}

fn print_report(report: &ShutdownReport) {
    println!("Shutdown report:");
    println!("  acknowledged:    {:?}", report.acknowledged);
    println!("  forced:          {:?}", report.forced);
    println!("  already stopped: {:?}", report.already_stopped);
}

fn inspect(path: &Path) -> Result<()> {
    let snapshot =
        load_snapshot(path).with_context(|| format!("reading snapshot {}", path.display()))?;
    let schema = &snapshot.schema;
    println!("Snapshot {}", path.display());
    println!(
        "  format v{}, runtime {}, application {}",
        schema.format_version, schema.runtime_version, schema.user_version
    );
    if let Some(root) = &schema.app_root {
        println!("  app root: {}", root.display());
    }
    for (name, state) in &snapshot.actors {
        println!("  {name}: {}", state.as_value());
    }
    Ok(())
}
