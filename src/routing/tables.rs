//! Routing configuration and the built-in keyword tables.
//!
//! Everything here is plain data: it deserializes from the `[routing]`
//! section of the config file, and [`RoutingConfig::default`] carries the
//! tables conductor ships with.

use serde::{Deserialize, Serialize};

use crate::routing::keywords::{weighted, WeightedKeyword};
use crate::routing::mode::default_multi_step_patterns;

/// Tier keyword tables for one domain.
///
/// Planning keywords pull towards tier 1, design keywords towards tier 2 and
/// implementation keywords towards tier 3.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierKeywords {
    pub planning: Vec<WeightedKeyword>,
    pub design: Vec<WeightedKeyword>,
    pub implementation: Vec<WeightedKeyword>,
}

impl TierKeywords {
    /// Append another table's keywords to this one.
    pub fn extended(mut self, other: &TierKeywords) -> Self {
        self.planning.extend(other.planning.iter().cloned());
        self.design.extend(other.design.iter().cloned());
        self.implementation.extend(other.implementation.iter().cloned());
        self
    }
}

/// Keyword rule for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<WeightedKeyword>,
    /// Domain-specific tier keywords, added on top of the shared tables.
    #[serde(default)]
    pub tiers: TierKeywords,
}

/// Routing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Role used for single-agent tasks in hybrid mode. Falls back to the
    /// registry's default agent when unset or unknown.
    pub lightweight_agent: Option<String>,
    /// Tie-break order between domains with equal scores. Domains not
    /// listed rank after listed ones, in declaration order.
    pub domain_priority: Vec<String>,
    /// Patterns that mark a description as multi-step.
    pub multi_step_patterns: Vec<String>,
    /// Tier keywords shared by every domain.
    pub tiers: TierKeywords,
    #[serde(rename = "domain")]
    pub domains: Vec<DomainRule>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            lightweight_agent: None,
            domain_priority: ["backend", "frontend", "testing", "devops", "research"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            multi_step_patterns: default_multi_step_patterns(),
            tiers: default_tier_keywords(),
            domains: default_domain_rules(),
        }
    }
}

impl RoutingConfig {
    pub fn domain(&self, name: &str) -> Option<&DomainRule> {
        self.domains.iter().find(|d| d.name == name)
    }
}

// ========== Built-in tables ==========
//
// Distinctive terms weigh 3, common ones 2, and generic verbs that show up
// across domains weigh 1.

pub fn default_tier_keywords() -> TierKeywords {
    TierKeywords {
        planning: weighted(&[
            ("plan", 2),
            ("roadmap", 3),
            ("strategy", 3),
            ("prioritize", 2),
            ("milestone", 2),
            ("decompose", 3),
            ("coordinate", 2),
            ("scope", 2),
            ("break down", 2),
        ]),
        design: weighted(&[
            ("design", 2),
            ("architecture", 3),
            ("architect", 3),
            ("review", 2),
            ("proposal", 2),
            ("trade-off", 2),
            ("tradeoff", 2),
            ("evaluate", 1),
            ("spec", 1),
        ]),
        implementation: weighted(&[
            ("implement", 3),
            ("fix", 3),
            ("refactor", 3),
            ("build", 2),
            ("write", 2),
            ("code", 2),
            ("configure", 2),
            ("add", 1),
            ("create", 1),
            ("update", 1),
            ("run", 1),
        ]),
    }
}

pub fn default_domain_rules() -> Vec<DomainRule> {
    vec![
        DomainRule {
            name: "frontend".to_string(),
            keywords: weighted(&[
                ("frontend", 3),
                ("react", 3),
                ("vue", 3),
                ("angular", 3),
                ("svelte", 3),
                ("css", 3),
                ("html", 3),
                ("ui", 2),
                ("component", 2),
                ("layout", 2),
                ("responsive", 2),
                ("accessibility", 2),
                ("browser", 2),
                ("button", 2),
                ("form", 1),
                ("page", 1),
                ("style", 1),
            ]),
            tiers: TierKeywords {
                design: weighted(&[("wireframe", 3), ("mockup", 3), ("design system", 3)]),
                implementation: weighted(&[("style", 1)]),
                ..Default::default()
            },
        },
        DomainRule {
            name: "backend".to_string(),
            keywords: weighted(&[
                ("backend", 3),
                ("api", 3),
                ("endpoint", 3),
                ("database", 3),
                ("sql", 3),
                ("graphql", 3),
                ("server", 2),
                ("rest", 2),
                ("schema", 2),
                ("migration", 2),
                ("auth", 2),
                ("cache", 2),
                ("queue", 2),
                ("service", 1),
                ("validate", 1),
                ("implement", 1),
            ]),
            tiers: TierKeywords {
                design: weighted(&[("data model", 3), ("api design", 3)]),
                implementation: weighted(&[("migrate", 2), ("query", 1)]),
                ..Default::default()
            },
        },
        DomainRule {
            name: "testing".to_string(),
            keywords: weighted(&[
                ("test", 3),
                ("unit test", 3),
                ("integration test", 3),
                ("e2e", 3),
                ("coverage", 3),
                ("qa", 3),
                ("regression", 2),
                ("fixture", 2),
                ("mock", 2),
                ("assert", 2),
                ("flaky", 2),
                ("verify", 1),
                ("validate", 1),
                ("bug", 1),
            ]),
            tiers: TierKeywords {
                planning: weighted(&[("test plan", 3), ("test strategy", 3)]),
                implementation: weighted(&[("test", 1)]),
                ..Default::default()
            },
        },
        DomainRule {
            name: "research".to_string(),
            keywords: weighted(&[
                ("research", 3),
                ("investigate", 3),
                ("survey", 3),
                ("literature", 3),
                ("compare", 2),
                ("comparison", 2),
                ("analyze", 2),
                ("analyse", 2),
                ("analysis", 2),
                ("benchmark", 2),
                ("study", 2),
                ("evaluate", 2),
                ("explore", 1),
                ("options", 1),
            ]),
            tiers: TierKeywords {
                implementation: weighted(&[("summarize", 2), ("benchmark", 1), ("research", 1)]),
                ..Default::default()
            },
        },
        DomainRule {
            name: "devops".to_string(),
            keywords: weighted(&[
                ("devops", 3),
                ("docker", 3),
                ("kubernetes", 3),
                ("k8s", 3),
                ("terraform", 3),
                ("helm", 3),
                ("ansible", 3),
                ("infrastructure", 3),
                ("ci", 3),
                ("ci/cd", 3),
                ("pipeline", 2),
                ("deploy", 2),
                ("monitoring", 2),
                ("container", 2),
                ("deployment", 1),
                ("release", 1),
            ]),
            tiers: TierKeywords {
                implementation: weighted(&[("deploy", 2), ("provision", 2)]),
                ..Default::default()
            },
        },
    ]
}
