//! Azure VM cost comparison CLI
//!
//! Collects inventory, actual cost, CPU utilization and retail prices for
//! the virtual machines of one or more subscriptions and writes a JSON and
//! HTML comparison report.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::quote::{run_quote, OsArg, QuoteOptions};
use commands::report::{run_report, ReportOptions};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Azure VM cost comparison
#[derive(Parser)]
#[command(name = "vmcost")]
#[command(author, version, about = "Azure VM cost, utilization and pricing comparison", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./vmcost.toml or ~/.config/vmcost/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the cost report for one or more subscriptions
    Report {
        /// Comma separated subscription IDs (prompted for when absent)
        #[arg(long, short, env = "VMCOST_SUBSCRIPTIONS")]
        subscriptions: Option<String>,

        /// Directory for output.json, pricing_data.json and vm_cost_report.html
        #[arg(long, short)]
        output_dir: Option<PathBuf>,

        /// Ignore the saved pricing cache and query every price again
        #[arg(long)]
        refresh_pricing: bool,

        /// Output format
        #[arg(long, short, default_value = "table")]
        format: output::OutputFormat,
    },

    /// Show the rates of one VM size in one region
    Quote {
        /// Azure region, e.g. eastus
        #[arg(long, short)]
        region: String,

        /// VM size, e.g. Standard_D2s_v3
        #[arg(long, short)]
        size: String,

        /// Operating system
        #[arg(long, default_value = "linux")]
        os: OsArg,

        /// Assume Azure Hybrid Benefit (bring your own license)
        #[arg(long)]
        ahb: bool,

        /// Directory holding pricing_data.json
        #[arg(long, short)]
        output_dir: Option<PathBuf>,

        /// Output format
        #[arg(long, short, default_value = "table")]
        format: output::OutputFormat,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let settings = config::Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Report {
            subscriptions,
            output_dir,
            refresh_pricing,
            format,
        } => {
            run_report(
                &settings,
                ReportOptions {
                    subscriptions,
                    output_dir,
                    refresh_pricing,
                    format,
                },
            )
            .await?;
        }
        Commands::Quote {
            region,
            size,
            os,
            ahb,
            output_dir,
            format,
        } => {
            run_quote(
                &settings,
                QuoteOptions {
                    region,
                    size,
                    os,
                    ahb,
                    output_dir,
                    format,
                },
            )
            .await?;
        }
    }

    Ok(())
}
