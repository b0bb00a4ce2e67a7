//! Tier classification.
//!
//! Within a domain, text is scored against three tables: planning words
//! point at the orchestration tier, design words at domain leads and
//! implementation words at specialists.

use serde::Serialize;
use std::collections::HashMap;

use crate::core::agent::Tier;
use crate::error::Result;
use crate::routing::keywords::KeywordTable;
use crate::routing::tables::{RoutingConfig, TierKeywords};

/// Outcome of the tier phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierMatch {
    pub tier: Tier,
    pub score: u32,
    pub matched: Vec<String>,
}

/// Compiled tables, indexed by `Tier::level() - 1`.
#[derive(Debug, Clone)]
struct TierTables([KeywordTable; 3]);

impl TierTables {
    fn compile(keywords: &TierKeywords) -> Result<Self> {
        Ok(Self([
            KeywordTable::compile(&keywords.planning)?,
            KeywordTable::compile(&keywords.design)?,
            KeywordTable::compile(&keywords.implementation)?,
        ]))
    }

    fn table(&self, tier: Tier) -> &KeywordTable {
        &self.0[usize::from(tier.level() - 1)]
    }
}

#[derive(Debug, Clone)]
pub struct TierClassifier {
    shared: TierTables,
    per_domain: HashMap<String, TierTables>,
}

impl TierClassifier {
    pub fn new(config: &RoutingConfig) -> Result<Self> {
        let shared = TierTables::compile(&config.tiers)?;
        let mut per_domain = HashMap::new();
        for rule in &config.domains {
            let merged = config.tiers.clone().extended(&rule.tiers);
            per_domain.insert(rule.name.clone(), TierTables::compile(&merged)?);
        }
        Ok(Self { shared, per_domain })
    }

    /// Pick the best tier for `text` within `domain`.
    ///
    /// Ties and all-zero scores go to the more concrete tier.
    pub fn classify(&self, domain: &str, text: &str) -> TierMatch {
        let tables = self.per_domain.get(domain).unwrap_or(&self.shared);

        let mut best: Option<TierMatch> = None;
        for tier in [Tier::Specialist, Tier::DomainLead, Tier::Orchestration] {
            let score = tables.table(tier).score(text);
            let better = best.as_ref().map_or(true, |b| score.score > b.score);
            if better {
                best = Some(TierMatch {
                    tier,
                    score: score.score,
                    matched: score.matched,
                });
            }
        }
        best.unwrap_or(TierMatch {
            tier: Tier::Specialist,
            score: 0,
            matched: Vec::new(),
        })
    }
}
