//! Turbo CLI - offline tool for pricing rules and product indexes.
//!
//! Commands:
//! - `turbo rules` - Evaluate and inspect pricing rules
//! - `turbo query` - Compile product list descriptions into search requests
//! - `turbo index` - Plan relational index structure changes
//! - `turbo config` - Show configuration

mod commands;
mod config;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ConfigArgs, IndexArgs, QueryArgs, RulesArgs};

/// Turbo CLI - Check pricing rules and plan product index changes
#[derive(Parser)]
#[command(name = "turbo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate and inspect pricing rules
    Rules(RulesArgs),

    /// Compile product list queries
    Query(QueryArgs),

    /// Plan product index structures
    Index(IndexArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = output::Output::new(cli.verbose, cli.json);

    let config_path = cli.config.as_deref();
    let ctx = context::Context::load(config_path, output)?;

    let result = match cli.command {
        Commands::Rules(args) => commands::rules::run(args, &ctx),
        Commands::Query(args) => commands::query::run(args, &ctx),
        Commands::Index(args) => commands::index::run(args, &ctx),
        Commands::Config(args) => commands::config::run(args, &ctx),
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
