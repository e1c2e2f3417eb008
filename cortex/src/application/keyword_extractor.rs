// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Keyword Extractor
//!
//! Maps free text to an expanded keyword set for set-overlap retrieval.
//!
//! 1. Tokenise (lowercase, alphanumeric runs; dotted numbers such as `2.5`
//!    or `411.3.3` stay whole). Compounds joined by `-` or `&` (`tn-c-s`,
//!    `t&e`) are kept whole and also contribute their parts.
//! 2. Drop stop-words and single characters.
//! 3. Expand each token through a static many-to-many synonym table.
//! 4. Union with the originals and cap the size.
//!
//! Pure and allocation-light: no I/O, no clock, no randomness. The output
//! order is deterministic (originals in first-seen order, then expansions).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_MAX_KEYWORDS: usize = 50;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z0-9]+(?:\.[0-9]+)*(?:[-&][a-z0-9]+(?:\.[0-9]+)*)*").expect("static token regex"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in",
        "into", "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were",
        "will", "with", "we", "our", "need", "needs", "new", "please", "want", "would", "should",
        "can", "could", "all", "any", "some", "per", "via",
    ]
    .into_iter()
    .collect()
});

/// Groups of interchangeable terms. Every member of a group expands to every
/// other member, which makes the table many-to-many without listing each
/// direction by hand.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &["cable", "cabling", "conductor", "wiring", "twin", "t&e"],
    &["rcd", "rcbo", "residual", "earth", "leakage"],
    &["mcb", "breaker", "overcurrent", "protective", "device"],
    &["shower", "electric", "instantaneous", "bathroom"],
    &["bathroom", "special", "location", "zones", "701"],
    &["socket", "sockets", "outlet", "ring", "radial"],
    &["lighting", "lights", "luminaire", "downlight"],
    &["cooker", "oven", "hob", "kitchen"],
    &["ev", "charger", "charging", "vehicle", "722"],
    &["voltage", "drop", "volt", "millivolt"],
    &["earthing", "tn-c-s", "tncs", "pme", "tn-s", "tt", "electrode"],
    &["isolation", "isolate", "isolator", "lockout", "prove", "dead"],
    &["height", "ladder", "scaffold", "tower", "mewp"],
    &["asbestos", "acm", "survey"],
    &["swa", "armoured", "buried", "underground", "outdoor"],
    &["solar", "pv", "inverter", "712"],
    &["heat", "pump", "ashp", "outdoor"],
    &["testing", "test", "inspection", "verification", "eicr"],
    &["consumer", "unit", "board", "distribution", "cu"],
    &["fire", "alarm", "smoke", "detector"],
];

static SYNONYMS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
    for group in SYNONYM_GROUPS {
        for term in group.iter() {
            let entry = map.entry(*term).or_default();
            for other in group.iter() {
                if other != term && !entry.contains(other) {
                    entry.push(*other);
                }
            }
        }
    }
    map
});

#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    max_keywords: usize,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEYWORDS)
    }
}

impl KeywordExtractor {
    pub fn new(max_keywords: usize) -> Self {
        Self { max_keywords }
    }

    pub fn max_keywords(&self) -> usize {
        self.max_keywords
    }

    /// Raw tokens after stop-word removal, first-seen order, deduplicated.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut seen = HashSet::new();
        TOKEN_RE
            .find_iter(&lower)
            .map(|m| m.as_str())
            .flat_map(|token| {
                let compound = token.contains(['-', '&']);
                std::iter::once(token).chain(token.split(['-', '&']).filter(move |_| compound))
            })
            .filter(|t| t.len() > 1 && !STOP_WORDS.contains(t))
            .filter(|t| seen.insert(*t))
            .map(str::to_string)
            .collect()
    }

    /// Tokens unioned with their synonyms, capped at `max_keywords`.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let originals = self.tokenize(text);
        let mut seen: HashSet<String> = originals.iter().cloned().collect();
        let mut keywords = originals.clone();

        for token in &originals {
            if let Some(expansions) = SYNONYMS.get(token.as_str()) {
                for synonym in expansions {
                    if seen.insert((*synonym).to_string()) {
                        keywords.push((*synonym).to_string());
                    }
                }
            }
        }

        keywords.truncate(self.max_keywords);
        keywords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stop_words_and_keeps_dotted_numbers() {
        let extractor = KeywordExtractor::default();
        let tokens = extractor.tokenize("Install a 2.5mm cable per Reg 411.3.3 for the shower");
        assert!(tokens.contains(&"2.5".to_string()));
        assert!(tokens.contains(&"mm".to_string()));
        assert!(!tokens.contains(&"2.5mm".to_string()));
        assert!(tokens.contains(&"411.3.3".to_string()));
        assert!(tokens.contains(&"shower".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"a".to_string()));
    }

    #[test]
    fn test_hyphenated_earthing_expands() {
        let extractor = KeywordExtractor::default();
        let keywords = extractor.extract("domestic TN-C-S radial");
        assert!(keywords.contains(&"tn-c-s".to_string()));
        assert!(keywords.contains(&"tn".to_string()));
        assert!(keywords.contains(&"pme".to_string()));
        assert!(!keywords.contains(&"c".to_string()));

        let tokens = extractor.tokenize("3 core T&E to the ring-final");
        assert_eq!(tokens, vec!["core", "t&e", "ring-final", "ring", "final"]);
        assert!(extractor.extract("T&E").contains(&"cable".to_string()));
    }

    #[test]
    fn test_expansion_is_many_to_many() {
        let extractor = KeywordExtractor::default();
        let from_rcd = extractor.extract("rcd");
        assert!(from_rcd.contains(&"rcbo".to_string()));
        let from_rcbo = extractor.extract("rcbo");
        assert!(from_rcbo.contains(&"rcd".to_string()));
    }

    #[test]
    fn test_originals_come_first() {
        let extractor = KeywordExtractor::default();
        let keywords = extractor.extract("shower circuit");
        assert_eq!(keywords[0], "shower");
        assert_eq!(keywords[1], "circuit");
    }

    #[test]
    fn test_output_is_capped() {
        let extractor = KeywordExtractor::new(5);
        let keywords = extractor.extract("cable rcd shower socket lighting cooker ev solar");
        assert_eq!(keywords.len(), 5);
    }

    #[test]
    fn test_deterministic() {
        let extractor = KeywordExtractor::default();
        let text = "EV charger on TT earthing with outdoor SWA";
        assert_eq!(extractor.extract(text), extractor.extract(text));
    }

    #[test]
    fn test_no_duplicates() {
        let extractor = KeywordExtractor::default();
        let keywords = extractor.extract("bathroom shower bathroom");
        let unique: HashSet<_> = keywords.iter().collect();
        assert_eq!(unique.len(), keywords.len());
    }
}
