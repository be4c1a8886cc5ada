// ROA-RL Control CLI
// Policy iteration training and region-of-attraction estimation

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::{RunConfig, SystemKind};

#[derive(Parser)]
#[command(name = "roactl")]
#[command(about = "Approximate policy iteration and ROA estimation", version)]
struct Cli {
    /// JSON run configuration, defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a policy and value function
    Train {
        /// Override the configured system
        #[arg(short, long, value_enum)]
        system: Option<SystemKind>,

        /// Override the number of outer iterations
        #[arg(short = 'k', long)]
        iterations: Option<usize>,

        /// Report destination
        #[arg(short, long, default_value = "roa_training.json")]
        output: PathBuf,
    },

    /// Estimate the LQR baseline's region of attraction on a grid
    Roa {
        /// Override the grid vertices per axis
        #[arg(short = 'n', long)]
        points: Option<usize>,

        /// Optional report destination
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the LQR gain of the cart-pole linearization
    Lqr,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = RunConfig::load(cli.config.as_deref())?;
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    match cli.command {
        Commands::Train {
            system,
            iterations,
            output,
        } => {
            if let Some(system) = system {
                config.system = system;
            }
            if let Some(iterations) = iterations {
                config.training.outer_iterations = iterations;
            }
            config.validate()?;
            commands::train(&config, &output)?;
        }

        Commands::Roa { points, output } => {
            if let Some(points) = points {
                config.grid_points = points;
            }
            config.validate()?;
            commands::roa(&config, output.as_deref())?;
        }

        Commands::Lqr => {
            commands::lqr(&config)?;
        }
    }

    Ok(())
}
