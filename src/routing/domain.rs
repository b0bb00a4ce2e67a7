//! Domain classification.

use serde::Serialize;

use crate::error::Result;
use crate::routing::keywords::KeywordTable;
use crate::routing::tables::RoutingConfig;

/// A domain's score for some text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainMatch {
    pub domain: String,
    pub score: u32,
    pub matched: Vec<String>,
}

#[derive(Debug, Clone)]
struct DomainEntry {
    name: String,
    /// Position in the tie-break order; lower wins.
    rank: usize,
    table: KeywordTable,
}

/// Scores text against each domain's weighted keyword table.
#[derive(Debug, Clone)]
pub struct DomainClassifier {
    domains: Vec<DomainEntry>,
}

impl DomainClassifier {
    pub fn new(config: &RoutingConfig) -> Result<Self> {
        let listed = config.domain_priority.len();
        let mut domains = Vec::with_capacity(config.domains.len());
        for (position, rule) in config.domains.iter().enumerate() {
            let rank = config
                .domain_priority
                .iter()
                .position(|d| d == &rule.name)
                .unwrap_or(listed + position);
            domains.push(DomainEntry {
                name: rule.name.clone(),
                rank,
                table: KeywordTable::compile(&rule.keywords)?,
            });
        }
        Ok(Self { domains })
    }

    /// Every domain with a positive score, best first.
    pub fn scores(&self, text: &str) -> Vec<DomainMatch> {
        let mut ranked: Vec<(usize, DomainMatch)> = self
            .domains
            .iter()
            .filter_map(|entry| {
                let score = entry.table.score(text);
                score.is_match().then(|| {
                    (
                        entry.rank,
                        DomainMatch {
                            domain: entry.name.clone(),
                            score: score.score,
                            matched: score.matched,
                        },
                    )
                })
            })
            .collect();
        ranked.sort_by(|(rank_a, a), (rank_b, b)| b.score.cmp(&a.score).then(rank_a.cmp(rank_b)));
        ranked.into_iter().map(|(_, m)| m).collect()
    }

    /// The highest-scoring domain, or `None` when nothing matched.
    pub fn classify(&self, text: &str) -> Option<DomainMatch> {
        self.scores(text).into_iter().next()
    }

    pub fn domain_names(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(|d| d.name.as_str())
    }
}
