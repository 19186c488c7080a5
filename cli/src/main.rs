mod commands;
mod config;
mod server;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{cmd_foods, cmd_report};
use crate::config::Config;
use prato_core::service::{ChartOptions, NutrientService};

#[derive(Parser)]
#[command(
    name = "prato",
    version,
    about = "Nutrient totals and charts for a meal, from a food composition table"
)]
struct Cli {
    /// Reference table CSV (default: $PRATO_TABLE, then taco.csv in the data directory)
    #[arg(long, global = true, value_name = "PATH")]
    table: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the foods in the reference table
    Foods {
        /// Case-insensitive substring to filter names
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build the nutrient report for a meal
    Report {
        /// Food name (repeatable)
        #[arg(short, long = "food", value_name = "NAME", required = true)]
        foods: Vec<String>,
        /// Meal date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Directory to write the CSV, XLSX, PDF and ZIP exports into
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
        /// Put the stacked bar chart first in PDF and ZIP exports
        #[arg(long)]
        with_bar_chart: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Put the stacked bar chart first in PDF and ZIP exports
        #[arg(long)]
        with_bar_chart: bool,
        /// Minutes a session may stay idle before it is dropped
        #[arg(long, default_value = "30", value_name = "MINUTES")]
        session_ttl: u64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn load_service(config: &Config, include_bar_chart: bool) -> Result<NutrientService> {
    let service = NutrientService::from_path(&config.table_path).with_context(|| {
        format!(
            "Failed to load reference table {} (use --table or {})",
            config.table_path.display(),
            config::TABLE_ENV
        )
    })?;
    Ok(service.with_options(ChartOptions { include_bar_chart }))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.table)?;

    match cli.command {
        Commands::Foods { search, json } => {
            let service = load_service(&config, false)?;
            cmd_foods(&service, search.as_deref(), json)
        }
        Commands::Report {
            foods,
            date,
            out,
            with_bar_chart,
            json,
        } => {
            let service = load_service(&config, with_bar_chart)?;
            cmd_report(&service, foods, date, out.as_deref(), json)
        }
        Commands::Serve {
            port,
            bind,
            with_bar_chart,
            session_ttl,
        } => {
            let service = load_service(&config, with_bar_chart)?;
            let ttl = Duration::from_secs(session_ttl.saturating_mul(60));
            server::start_server(service, port, &bind, ttl).await
        }
    }
}
