// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # sparkplan CLI
//!
//! The `sparkplan` binary runs electrical installation planning jobs
//! in-process against the configured completion provider and knowledge base.
//!
//! ## Commands
//!
//! - `sparkplan job run` - Submit and process one job
//! - `sparkplan knowledge keywords|search` - Inspect retrieval
//! - `sparkplan config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sparkplan_cli::commands::{self, ConfigCommand, JobCommand, KnowledgeCommand};

/// sparkplan - electrical installation planning orchestrator
#[derive(Parser)]
#[command(name = "sparkplan")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SPARKPLAN_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SPARKPLAN_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Planning jobs
    #[command(name = "job")]
    Job {
        #[command(subcommand)]
        command: JobCommand,
    },

    /// Knowledge base inspection
    #[command(name = "knowledge")]
    Knowledge {
        #[command(subcommand)]
        command: KnowledgeCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Job { command } => commands::job::handle_command(command, cli.config).await,
        Commands::Knowledge { command } => commands::knowledge::handle_command(command, cli.config).await,
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
