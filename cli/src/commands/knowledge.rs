// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Knowledge inspection commands
//!
//! Commands: keywords, search

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use sparkplan_core::domain::config::{OrchestratorConfigManifest, RetrievalConfig};
use sparkplan_cortex::{KeywordExtractor, RetrievalOutcome, Retriever};

use crate::embedded::load_knowledge;

#[derive(Subcommand)]
pub enum KnowledgeCommand {
    /// Show the keywords extracted from a query
    Keywords {
        /// Free text, e.g. a circuit description
        text: String,
    },

    /// Run a fused search over the configured knowledge bases
    Search {
        /// Knowledge base file (overrides spec.retrieval.knowledge_path)
        #[arg(short, long, value_name = "FILE")]
        knowledge: Option<PathBuf>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,

        text: String,
    },
}

pub async fn handle_command(command: KnowledgeCommand, config_override: Option<PathBuf>) -> Result<()> {
    let config = OrchestratorConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let retrieval = &config.spec.retrieval;

    match command {
        KnowledgeCommand::Keywords { text } => {
            let keywords = KeywordExtractor::new(retrieval.max_keywords).extract(&text);
            if keywords.is_empty() {
                println!("{}", "No keywords extracted".yellow());
            }
            for keyword in keywords {
                println!("{}", keyword);
            }
            Ok(())
        }
        KnowledgeCommand::Search { knowledge, json, text } => {
            let outcome = search(retrieval, knowledge, &text).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
            Ok(())
        }
    }
}

pub async fn search(retrieval: &RetrievalConfig, knowledge: Option<PathBuf>, text: &str) -> Result<RetrievalOutcome> {
    let path = knowledge
        .or_else(|| retrieval.knowledge_path.clone())
        .context("No knowledge file given (use --knowledge or spec.retrieval.knowledge_path)")?;
    let store = load_knowledge(&path)?;

    let retriever = Retriever::new(Arc::new(store), retrieval.sources.clone())
        .with_extractor(KeywordExtractor::new(retrieval.max_keywords))
        .with_rrf_k(retrieval.rrf_k)
        .with_result_limit(retrieval.result_limit);

    retriever.retrieve(text).await.context("Search failed")
}

fn print_outcome(outcome: &RetrievalOutcome) {
    println!("{} {}", "Keywords:".bold(), outcome.keywords.join(", "));
    if outcome.results.is_empty() {
        println!("{}", "No matching facets".yellow());
        return;
    }
    println!();
    for (rank, result) in outcome.results.iter().enumerate() {
        let sources: Vec<&str> = result.sources.iter().map(String::as_str).collect();
        println!(
            "{:>3}. {} {} {}",
            rank + 1,
            format!("{:.4}", result.score).cyan(),
            result.item.id.as_str().bold(),
            format!("[{}] {}", result.item.facet_type, sources.join("+")).dimmed()
        );
        println!("     {}", first_line(&result.item.content));
    }
}

fn first_line(content: &str) -> &str {
    content.lines().next().unwrap_or_default()
}
