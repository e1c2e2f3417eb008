// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use sparkplan_core::domain::config::{OrchestratorConfigManifest, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./sparkplan-config.yaml)
        #[arg(short, long, default_value = "./sparkplan-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = OrchestratorConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./sparkplan-config.yaml");
        println!("  4. ~/.sparkplan/config.yaml");
        println!("  5. /etc/sparkplan/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{} {}", "Current configuration:".bold(), config.metadata.name);
    println!();

    println!("{}", "Cache:".bold());
    println!("  Secret: {}", redact(&spec.cache.secret));
    println!("  L1 full results TTL: {}", humantime::format_duration(spec.cache.full_result_ttl));
    println!("  L2 retrieval TTL: {}", humantime::format_duration(spec.cache.retrieval_ttl));
    println!("  L3 partial results TTL: {}", humantime::format_duration(spec.cache.partial_ttl));
    println!();

    println!("{}", "Circuit breakers:".bold());
    println!(
        "  default: {} failures, {} cooldown",
        spec.breaker.defaults.threshold,
        humantime::format_duration(spec.breaker.defaults.reset_timeout)
    );
    for (name, breaker) in &spec.breaker.overrides {
        println!(
            "  {}: {} failures, {} cooldown",
            name,
            breaker.threshold,
            humantime::format_duration(breaker.reset_timeout)
        );
    }
    println!(
        "  Retry: {} attempts, {} backoff x{}",
        spec.retry.max_attempts,
        humantime::format_duration(spec.retry.backoff),
        spec.retry.multiplier
    );
    println!();

    println!("{}", "Agents:".bold());
    println!("  Timeout: {}", humantime::format_duration(spec.agents.timeout));
    println!("  Stale after: {}", humantime::format_duration(spec.agents.stale_after));
    println!(
        "  Designer split: {} (above {} circuits, depth {})",
        enabled(spec.agents.designer_split.enabled),
        spec.agents.designer_split.threshold,
        spec.agents.designer_split.max_split_depth
    );
    println!("  Installer fallback: {}", enabled(spec.agents.installer_fallback));
    println!();

    println!("{}", "Retrieval:".bold());
    match &spec.retrieval.knowledge_path {
        Some(path) => println!("  Knowledge file: {}", path.display()),
        None => println!("  Knowledge file: {}", "(not set)".dimmed()),
    }
    for source in &spec.retrieval.sources {
        println!("  - {} (weight {})", source.knowledge_base, source.weight);
    }
    println!("  RRF k: {}, limit: {}", spec.retrieval.rrf_k, spec.retrieval.result_limit);
    println!();

    println!("{}", "Completion:".bold());
    match &spec.completion {
        Some(completion) => {
            println!("  {} ({})", completion.model.bold(), completion.provider_type);
            println!("    Endpoint: {}", completion.endpoint);
        }
        None => println!("  {}", "(not configured)".yellow()),
    }
    println!();

    println!("{}", "Storage:".bold());
    match &spec.database {
        Some(database) => println!("  PostgreSQL ({} connections)", database.max_connections),
        None => println!("  In-memory"),
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = OrchestratorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml").to_string()
    } else {
        OrchestratorConfigManifest::default().to_yaml_string()?
    };

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

fn redact(secret: &str) -> String {
    if secret.starts_with("env:") {
        secret.to_string()
    } else {
        "********".to_string()
    }
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}
