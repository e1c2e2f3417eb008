// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Job commands
//!
//! Commands: run

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use sparkplan_core::domain::{
    agent::JobResult,
    config::OrchestratorConfigManifest,
    events::JobEvent,
    job::{AgentStatus, Job},
};
use sparkplan_core::infrastructure::event_bus::{EventBusError, EventReceiver};

use crate::embedded::{load_inputs, EmbeddedRunner};

#[derive(Subcommand)]
pub enum JobCommand {
    /// Submit and process one job in-process
    Run {
        /// Job inputs (JSON or YAML)
        #[arg(short, long, value_name = "FILE")]
        inputs: PathBuf,

        /// Knowledge base file (overrides spec.retrieval.knowledge_path)
        #[arg(short, long, value_name = "FILE")]
        knowledge: Option<PathBuf>,

        /// Print the final job record as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: JobCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        JobCommand::Run {
            inputs,
            knowledge,
            json,
        } => run(config_override, inputs, knowledge, json).await,
    }
}

async fn run(
    config_override: Option<PathBuf>,
    inputs_path: PathBuf,
    knowledge: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let config = OrchestratorConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let inputs = load_inputs(&inputs_path)?;
    let runner = EmbeddedRunner::new(&config, knowledge.as_deref()).await?;

    let progress = (!json).then(|| {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        let events = runner.orchestrator().events().subscribe();
        tokio::spawn(follow_progress(events, bar))
    });

    let (response, job) = runner.run(inputs).await?;
    if let Some(handle) = progress {
        // The listener ends on the terminal event; abort covers an early return
        handle.abort();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        print_job(&job);
    }

    if response.success {
        Ok(())
    } else if response.cancelled {
        anyhow::bail!("Job {} was cancelled", response.job_id)
    } else if response.in_progress {
        anyhow::bail!("Job {} is already being processed", response.job_id)
    } else {
        anyhow::bail!(
            "Job {} failed: {}",
            response.job_id,
            response.error.unwrap_or_else(|| "unknown error".to_string())
        )
    }
}

async fn follow_progress(mut events: EventReceiver, bar: ProgressBar) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(EventBusError::Lagged(_)) => continue,
            Err(_) => return,
        };
        match &event {
            JobEvent::AgentProgress {
                agent,
                overall_percent,
                message,
                ..
            } => {
                bar.set_position(u64::from(*overall_percent));
                bar.set_message(format!("{}: {}", agent, message));
            }
            JobEvent::RetrievalCompleted { result_count, .. } => {
                bar.set_message(format!("retrieved {} references", result_count));
            }
            JobEvent::AgentSplit {
                agent,
                first_half,
                second_half,
                ..
            } => {
                bar.println(format!(
                    "{} {} timed out, splitting into {} + {} circuits",
                    "↳".yellow(),
                    agent,
                    first_half,
                    second_half
                ));
            }
            JobEvent::AgentFallback { agent, fallback, .. } => {
                bar.println(format!("{} {} fell back to {}", "↳".yellow(), agent, fallback));
            }
            _ => {}
        }
        if event.is_terminal() {
            bar.finish_and_clear();
            return;
        }
    }
}

fn print_job(job: &Job) {
    let status = match job.status {
        s if s.is_terminal() && job.result.is_some() => s.to_string().green(),
        s => s.to_string().red(),
    };
    println!("{} {} ({})", "Job".bold(), job.id, status);
    for (kind, agent) in &job.agents {
        let marker = match agent.status {
            AgentStatus::Complete => "✓".green(),
            AgentStatus::Cached => "↺".cyan(),
            AgentStatus::Failed => "✗".red(),
            _ => "·".dimmed(),
        };
        println!("  {} {:<14} {}", marker, kind.to_string(), agent.message.as_deref().unwrap_or(""));
    }
    if let Some(error) = &job.error {
        println!("{} {}", "Error:".red().bold(), error);
    }
    if let Some(result) = &job.result {
        print_result(result);
    }
}

fn print_result(result: &JobResult) {
    if let Some(design) = &result.design {
        println!();
        println!("{}", "Circuit design".bold());
        for circuit in &design.circuits {
            let compliant = if circuit.compliant { "ok".green() } else { "check".yellow() };
            println!(
                "  {:<24} {:>5} mm² {:<10} {} {:>4} A  Vd {:.2}%  [{}]",
                circuit.name,
                circuit.cable_size_mm2,
                circuit.cable_type,
                circuit.protective_device,
                circuit.device_rating_a,
                circuit.voltage_drop_percent,
                compliant
            );
        }
    }
    if let Some(installation) = &result.installation {
        println!();
        println!("{}", "Installation method".bold());
        for step in &installation.steps {
            println!("  {:>2}. {}", step.step, step.title);
        }
    }
    if let Some(assessment) = &result.risk_assessment {
        println!();
        println!("{}", "Risk assessment".bold());
        for hazard in &assessment.hazards {
            println!(
                "  {:>2} {:?} {}",
                hazard.risk_score, hazard.risk_level, hazard.hazard
            );
        }
    }
    println!();
    println!(
        "{} {} ms, {} references{}",
        "Generated in".dimmed(),
        result.metadata.generation_time_ms,
        result.metadata.rag_source_count,
        if result.metadata.agents_from_cache.is_empty() {
            String::new()
        } else {
            format!(", cached: {:?}", result.metadata.agents_from_cache)
        }
    );
}
