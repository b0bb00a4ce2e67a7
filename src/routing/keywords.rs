//! Weighted keyword tables.
//!
//! Every routing phase scores text the same way: the sum of the weights of
//! the keywords found in it. Matching is case-insensitive on word
//! boundaries, and a trailing plural `s`/`es` is accepted.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A keyword and the weight it contributes when matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedKeyword {
    pub term: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl WeightedKeyword {
    pub fn new(term: &str, weight: u32) -> Self {
        Self {
            term: term.to_string(),
            weight,
        }
    }
}

/// Build a keyword list from `(term, weight)` pairs.
pub fn weighted(pairs: &[(&str, u32)]) -> Vec<WeightedKeyword> {
    pairs
        .iter()
        .map(|(term, weight)| WeightedKeyword::new(term, *weight))
        .collect()
}

/// Score of a text against a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordScore {
    pub score: u32,
    /// Matched terms in table order.
    pub matched: Vec<String>,
}

impl KeywordScore {
    pub fn is_match(&self) -> bool {
        self.score > 0
    }
}

/// A compiled keyword table.
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    entries: Vec<(WeightedKeyword, Regex)>,
}

impl KeywordTable {
    /// Compile keywords into boundary-anchored, case-insensitive patterns.
    ///
    /// Blank terms and zero weights are dropped.
    pub fn compile(keywords: &[WeightedKeyword]) -> Result<Self> {
        let mut entries = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let term = keyword.term.trim();
            if term.is_empty() || keyword.weight == 0 {
                continue;
            }
            // `\b` does not work next to symbols such as `c++`, so anchor on
            // non-word characters instead.
            let pattern = format!(r"(?i)(?:^|\W){}(?:s|es)?(?:$|\W)", regex::escape(term));
            entries.push((keyword.clone(), Regex::new(&pattern)?));
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Sum the weights of all keywords found in `text`.
    pub fn score(&self, text: &str) -> KeywordScore {
        let mut result = KeywordScore::default();
        for (keyword, regex) in &self.entries {
            if regex.is_match(text) {
                result.score = result.score.saturating_add(keyword.weight);
                result.matched.push(keyword.term.clone());
            }
        }
        result
    }
}
