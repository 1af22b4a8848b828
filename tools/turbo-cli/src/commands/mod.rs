//! CLI command implementations.

pub mod config;
pub mod index;
pub mod query;
pub mod rules;

use clap::{Args, Subcommand};

/// Arguments for the rules command.
#[derive(Args)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub command: RulesCommand,
}

#[derive(Subcommand)]
pub enum RulesCommand {
    /// Evaluate rules against an environment document.
    Check {
        /// Rule documents (JSON list).
        #[arg(short, long)]
        rules: Option<String>,

        /// Environment document (JSON or TOML).
        #[arg(short, long)]
        env: Option<String>,
    },
    /// Print the condition tree of each rule.
    Inspect {
        /// Rule documents (JSON list).
        #[arg(short, long)]
        rules: Option<String>,

        /// Only list leaf conditions of this type.
        #[arg(short = 't', long = "type")]
        condition_type: Option<String>,
    },
}

/// Arguments for the query command.
#[derive(Args)]
pub struct QueryArgs {
    #[command(subcommand)]
    pub command: QueryCommand,
}

#[derive(Subcommand)]
pub enum QueryCommand {
    /// Print the search and facet requests of a product list.
    Build {
        /// Tenant the list belongs to.
        #[arg(short, long)]
        tenant: String,

        /// Product list description (JSON or TOML).
        #[arg(short, long)]
        list: String,
    },
}

/// Arguments for the index command.
#[derive(Args)]
pub struct IndexArgs {
    #[command(subcommand)]
    pub command: IndexCommand,
}

#[derive(Subcommand)]
pub enum IndexCommand {
    /// Plan the DDL that brings relational index tables up to date.
    Plan {
        /// Only plan this tenant.
        #[arg(short, long)]
        tenant: Option<String>,

        /// Schema snapshot (JSON) to plan against; empty when not given.
        #[arg(short, long)]
        schema: Option<String>,

        /// Write change logs instead of printing them, into this directory
        /// or the configured one.
        #[arg(short, long)]
        write: Option<Option<String>>,

        /// Write the resulting schema snapshot to this file.
        #[arg(long)]
        schema_out: Option<String>,
    },
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Build every configured tenant and report errors.
    Validate,
}
