//! Stepflow command-line host
//!
//! Creates, edits, inspects and runs workflow directories.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use step_engine::{Settings, StepRegistry};

// Linked for the steps it registers with inventory
use workflow_steps as _;

use crate::commands::Host;

/// Stepflow - dependency-ordered workflows of pluggable steps
#[derive(Parser)]
#[command(name = "stepflow")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding settings.json (default: <config dir>/stepflow)
    #[arg(long, global = true)]
    settings_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty workflow in a directory
    New {
        /// Workflow directory
        dir: PathBuf,
    },

    /// Print steps, connections and execution order
    Show {
        /// Workflow directory (default: the last one used)
        dir: Option<PathBuf>,
    },

    /// Report every problem that would stop the workflow from running
    Validate {
        /// Workflow directory (default: the last one used)
        dir: Option<PathBuf>,
    },

    /// Run the workflow to completion
    Run {
        /// Workflow directory (default: the last one used)
        dir: Option<PathBuf>,
    },

    /// Add a step to a workflow
    Add {
        /// Registered step name, e.g. "Text Source"
        name: String,
        /// Identifier for the new step
        #[arg(long, short)]
        identifier: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        x: f64,
        #[arg(long, default_value_t = 0.0)]
        y: f64,
        /// Workflow directory (default: the last one used)
        #[arg(long, short)]
        dir: Option<PathBuf>,
    },

    /// Connect two steps by identifier and port index
    Connect {
        source: String,
        source_port: usize,
        destination: String,
        destination_port: usize,
        /// Workflow directory (default: the last one used)
        #[arg(long, short)]
        dir: Option<PathBuf>,
    },

    /// Pass a JSON configuration object to a step
    Configure {
        identifier: String,
        /// Configuration, e.g. '{"text": "hello"}'
        config: String,
        /// Workflow directory (default: the last one used)
        #[arg(long, short)]
        dir: Option<PathBuf>,
    },

    /// List the step types this host knows
    Steps,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let settings_dir = cli.settings_dir.or_else(Settings::default_dir);
    let settings = match &settings_dir {
        Some(dir) => Settings::load(dir).await.unwrap_or_else(|e| {
            log::warn!("Failed to load settings, using defaults: {}", e);
            Settings::default()
        }),
        None => {
            log::warn!("No config directory available; settings will not be kept");
            Settings::default()
        }
    };

    let registry = Arc::new(StepRegistry::with_builtins());
    let mut host = Host::new(registry, settings);
    let mut out = std::io::stdout();

    match cli.command {
        Commands::New { dir } => host.create(&dir, &mut out)?,
        Commands::Show { dir } => host.show(dir, &mut out)?,
        Commands::Validate { dir } => host.validate(dir, &mut out)?,
        Commands::Run { dir } => host.run(dir, &mut out).await?,
        Commands::Add {
            name,
            identifier,
            x,
            y,
            dir,
        } => host.add(dir, &name, identifier.as_deref(), (x, y), &mut out)?,
        Commands::Connect {
            source,
            source_port,
            destination,
            destination_port,
            dir,
        } => host.connect(
            dir,
            (source.as_str(), source_port),
            (destination.as_str(), destination_port),
            &mut out,
        )?,
        Commands::Configure {
            identifier,
            config,
            dir,
        } => host.configure(dir, &identifier, &config, &mut out)?,
        Commands::Steps => host.list_steps(&mut out)?,
    }

    if let Some(dir) = settings_dir {
        if let Err(e) = host.settings().save(&dir).await {
            log::warn!("Failed to save settings: {}", e);
        }
    }

    Ok(())
}
