//! Command-line host for the Xibo CMS node.

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use xibo_core::{Operation, OptionSource, Resource, XiboClient};

use crate::config::CliConfig;

/// Run Xibo CMS operations from the shell.
#[derive(Parser)]
#[command(name = "xibo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (YAML); `XIBO_*` variables override it
    #[arg(short, long, default_value = "xibo.yaml", global = true)]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one operation per input item and print the output items
    Run {
        /// Resource, e.g. display, layout, displayGroup
        resource: Resource,

        /// Operation, e.g. getAll, get, create, changeLayout
        operation: Operation,

        /// JSON array of items; `-` reads stdin
        #[arg(short, long, conflicts_with = "params")]
        items: Option<PathBuf>,

        /// Parameters of a single item as a JSON object
        #[arg(short, long)]
        params: Option<String>,

        /// Record failing items as {"error": ...} instead of stopping
        #[arg(long)]
        continue_on_fail: bool,
    },

    /// List dropdown options (displays, layouts, campaigns, displayGroups)
    Options {
        source: OptionSource,
    },

    /// Check the configured credential against /api/about
    Test,
}

fn init_tracing(verbose: u8, json: bool) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config = CliConfig::load(&cli.config)?;
    let client = XiboClient::new(config.credential, config.client)?;

    match cli.command {
        Commands::Run {
            resource,
            operation,
            items,
            params,
            continue_on_fail,
        } => commands::run(
            &client,
            resource,
            operation,
            items.as_deref(),
            params.as_deref(),
            continue_on_fail,
        ),
        Commands::Options { source } => commands::options(&client, source),
        Commands::Test => commands::test(&client),
    }
}
