//! CareCast CLI
//!
//! Trains forecast models, forecasts demand and optimizes staff allocation
//! offline, and reports the status of a running agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{optimize, predict, status, train};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// CareCast hospital demand forecasting and staff allocation
#[derive(Parser)]
#[command(name = "carecast")]
#[command(author, version, about = "CLI for CareCast demand forecasting and staff allocation", long_about = None)]
pub struct Cli {
    /// Agent URL for remote commands (can also be set via CARECAST_API_URL env var)
    #[arg(long, env = "CARECAST_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train forecast models from a CSV series and persist them
    Train {
        /// Historical series CSV
        #[arg(long)]
        data: PathBuf,

        /// Model directory (defaults to the config file value or ./models)
        #[arg(long, env = "CARECAST_MODEL_DIR")]
        model_dir: Option<PathBuf>,

        /// Forecast horizons in hours
        #[arg(long, value_delimiter = ',', default_value = "1,6,24")]
        horizons: Vec<u32>,
    },

    /// Forecast demand from the current state
    Predict {
        /// Model directory (defaults to the config file value or ./models)
        #[arg(long, env = "CARECAST_MODEL_DIR")]
        model_dir: Option<PathBuf>,

        /// Current state record, as inline JSON or a JSON file path
        #[arg(long)]
        state: String,

        /// Recent history CSV preceding the current state
        #[arg(long)]
        history: Option<PathBuf>,

        /// Forecast horizons in hours
        #[arg(long, value_delimiter = ',', default_value = "1,6,24")]
        horizons: Vec<u32>,
    },

    /// Optimize staff allocation for predicted demand
    Optimize {
        /// Request with current_staff, predicted_demand and constraints, as inline JSON or a file path
        #[arg(long)]
        input: String,
    },

    /// Show the health and models of a running agent
    Status,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::Config::load()?;

    match cli.command {
        Commands::Train {
            data,
            model_dir,
            horizons,
        } => {
            let model_dir = config.model_dir(model_dir.as_deref());
            train::run(&data, &model_dir, &horizons, cli.format)?;
        }
        Commands::Predict {
            model_dir,
            state,
            history,
            horizons,
        } => {
            let model_dir = config.model_dir(model_dir.as_deref());
            predict::run(&model_dir, &state, history.as_deref(), &horizons, cli.format)?;
        }
        Commands::Optimize { input } => {
            optimize::run(&input, cli.format)?;
        }
        Commands::Status => {
            let client = client::ApiClient::new(&config.api_url(cli.api_url.as_deref()))?;
            status::show_status(&client, cli.format).await?;
        }
    }

    Ok(())
}
