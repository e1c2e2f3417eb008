// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Cache Keys
//!
//! Deterministic keys for the three cache layers. Inputs are first reduced to
//! a [`NormalizedInputs`] value, where near-identical requests collapse onto
//! the same representation:
//!
//! - cable lengths round to the nearest 5 m
//! - load powers round to the nearest 100 W
//! - voltages round to the nearest volt
//! - text is lowercased, trimmed and whitespace-collapsed
//! - circuits and requested agents are sorted
//!
//! The canonical JSON of that value, plus the deployment secret, is hashed
//! with SHA-256. Keys never depend on wall-clock time or call order.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::job::{AgentKind, CircuitSpec, JobInputs};

pub const LENGTH_BUCKET_M: f64 = 5.0;
pub const POWER_BUCKET_W: f64 = 100.0;
pub const DEFAULT_QUERY_MAX_CHARS: usize = 200;

const FIELD_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct NormalizedCircuit {
    pub circuit_type: String,
    pub name: String,
    pub load_power_w: i64,
    pub cable_length_m: i64,
    pub voltage: i64,
    pub phases: u8,
    pub special_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedInputs {
    pub project_name: String,
    pub location: String,
    pub installation_type: String,
    pub supply_voltage: i64,
    pub earthing_system: String,
    pub circuits: Vec<NormalizedCircuit>,
    pub additional_prompt: Option<String>,
    pub agents: Vec<AgentKind>,
}

impl NormalizedInputs {
    pub fn canonical(&self) -> String {
        // Struct fields serialize in declaration order, so this is stable
        serde_json::to_string(self).unwrap_or_default()
    }

    fn without_agents(&self) -> Self {
        Self {
            agents: Vec::new(),
            ..self.clone()
        }
    }
}

/// Lowercase, trim and collapse internal whitespace runs to one space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn bucket(value: f64, step: f64) -> i64 {
    ((value / step).round() * step) as i64
}

fn normalize_circuit(circuit: &CircuitSpec) -> NormalizedCircuit {
    NormalizedCircuit {
        circuit_type: normalize_text(&circuit.circuit_type),
        name: normalize_text(&circuit.name),
        load_power_w: bucket(circuit.load_power_w, POWER_BUCKET_W),
        cable_length_m: bucket(circuit.cable_length_m, LENGTH_BUCKET_M),
        voltage: circuit.voltage.round() as i64,
        phases: circuit.phases,
        special_location: circuit
            .special_location
            .as_deref()
            .map(normalize_text)
            .filter(|s| !s.is_empty()),
    }
}

pub fn normalize(inputs: &JobInputs) -> NormalizedInputs {
    let mut circuits: Vec<NormalizedCircuit> = inputs.circuits.iter().map(normalize_circuit).collect();
    circuits.sort();

    let mut agents = inputs.agents.clone();
    agents.sort();
    agents.dedup();

    NormalizedInputs {
        project_name: normalize_text(&inputs.project_name),
        location: normalize_text(&inputs.location),
        installation_type: normalize_text(&inputs.installation_type),
        supply_voltage: inputs.supply_voltage.round() as i64,
        earthing_system: normalize_text(&inputs.earthing_system),
        circuits,
        additional_prompt: inputs
            .additional_prompt
            .as_deref()
            .map(normalize_text)
            .filter(|s| !s.is_empty()),
        agents,
    }
}

/// Normalised, truncated query text used for the retrieval layer key.
pub fn normalize_query(query: &str, max_chars: usize) -> String {
    normalize_text(query).chars().take(max_chars).collect()
}

fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            let mut buf = [0u8; 4];
            hasher.update(FIELD_SEPARATOR.encode_utf8(&mut buf).as_bytes());
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Derives keys for all three layers from one secret.
#[derive(Clone)]
pub struct CacheKeyer {
    secret: String,
    query_max_chars: usize,
}

impl std::fmt::Debug for CacheKeyer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheKeyer")
            .field("secret", &"<redacted>")
            .field("query_max_chars", &self.query_max_chars)
            .finish()
    }
}

impl CacheKeyer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            query_max_chars: DEFAULT_QUERY_MAX_CHARS,
        }
    }

    pub fn with_query_max_chars(mut self, max_chars: usize) -> Self {
        self.query_max_chars = max_chars;
        self
    }

    /// L1: the whole merged result for these inputs.
    pub fn full_result(&self, inputs: &JobInputs) -> String {
        sha256_hex(&[&normalize(inputs).canonical(), &self.secret])
    }

    /// L3: one agent's output. The requested agent set is excluded, so an
    /// agent's output is shared by jobs that asked for different siblings.
    pub fn partial(&self, inputs: &JobInputs, kind: AgentKind) -> String {
        let scope = normalize(inputs).without_agents().canonical();
        sha256_hex(&[&scope, kind.as_str(), &self.secret])
    }

    /// L2: `(knowledge base, truncated normalised query)`.
    pub fn retrieval(&self, knowledge_base: &str, query: &str) -> String {
        format!(
            "{}::{}",
            normalize_text(knowledge_base),
            normalize_query(query, self.query_max_chars)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn inputs(length: f64, power: f64) -> JobInputs {
        JobInputs {
            project_name: "Bathroom upgrade".into(),
            location: "York".into(),
            installation_type: "domestic".into(),
            supply_voltage: 230.0,
            earthing_system: "TN-C-S".into(),
            circuits: vec![CircuitSpec {
                name: "Shower".into(),
                circuit_type: "shower".into(),
                load_power_w: power,
                cable_length_m: length,
                voltage: 230.0,
                phases: 1,
                special_location: Some("bathroom".into()),
            }],
            additional_prompt: None,
            agents: vec![AgentKind::Designer, AgentKind::Installer],
        }
    }

    #[test]
    fn test_bucketing_collapses_nearby_lengths() {
        let keyer = CacheKeyer::new("s3cret");
        assert_eq!(
            keyer.full_result(&inputs(31.0, 9500.0)),
            keyer.full_result(&inputs(32.0, 9500.0))
        );
        assert_ne!(
            keyer.full_result(&inputs(31.0, 9500.0)),
            keyer.full_result(&inputs(38.0, 9500.0))
        );
    }

    #[test]
    fn test_text_and_order_insensitive() {
        let keyer = CacheKeyer::new("s3cret");
        let a = inputs(20.0, 9000.0);
        let mut b = a.clone();
        b.project_name = "  BATHROOM   upgrade ".into();
        b.agents.reverse();
        assert_eq!(keyer.full_result(&a), keyer.full_result(&b));
    }

    #[test]
    fn test_secret_and_agent_separate_keys() {
        let a = CacheKeyer::new("one");
        let b = CacheKeyer::new("two");
        let i = inputs(20.0, 9000.0);
        assert_ne!(a.full_result(&i), b.full_result(&i));
        assert_ne!(a.partial(&i, AgentKind::Designer), a.partial(&i, AgentKind::Installer));
        assert_ne!(a.full_result(&i), a.partial(&i, AgentKind::Designer));
    }

    #[test]
    fn test_partial_key_ignores_sibling_selection() {
        let keyer = CacheKeyer::new("s3cret");
        let a = inputs(20.0, 9000.0);
        let mut b = a.clone();
        b.agents = vec![AgentKind::Designer];
        assert_eq!(
            keyer.partial(&a, AgentKind::Designer),
            keyer.partial(&b, AgentKind::Designer)
        );
        assert_ne!(keyer.full_result(&a), keyer.full_result(&b));
    }

    #[test]
    fn test_retrieval_key_truncates_query() {
        let keyer = CacheKeyer::new("s3cret").with_query_max_chars(10);
        let key = keyer.retrieval("Regulations", "  Shower   Bathroom RCD zones ");
        assert_eq!(key, "regulations::shower bat");
    }

    proptest! {
        #[test]
        fn prop_key_is_stable_within_bucket(
            length_bucket in 1i64..40,
            length_offset in -2.4f64..2.4,
            power_bucket in 10i64..200,
            power_offset in -49.0f64..49.0,
        ) {
            let keyer = CacheKeyer::new("s3cret");
            let centre = inputs((length_bucket * 5) as f64, (power_bucket * 100) as f64);
            let nearby = inputs(
                (length_bucket * 5) as f64 + length_offset,
                (power_bucket * 100) as f64 + power_offset,
            );
            prop_assert_eq!(keyer.full_result(&centre), keyer.full_result(&nearby));
            prop_assert_eq!(keyer.full_result(&nearby), keyer.full_result(&nearby.clone()));
        }
    }
}
