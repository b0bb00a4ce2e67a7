//! Agent routing.
//!
//! Routing runs in four phases:
//!
//! 1. orchestration mode: flat, hierarchical, or hybrid (decided per task by
//!    the [`ModeSelector`])
//! 2. domain: weighted keyword scores, tie-broken by configured priority
//! 3. tier: planning, design or implementation keywords within the domain
//! 4. agent: the candidate with the most capability matches
//!
//! Every miss falls back to something usable, so routing never fails.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::core::agent::{Agent, AgentRegistry, Tier};
use crate::core::task::{Task, TaskId};
use crate::error::Result;
use crate::routing::domain::{DomainClassifier, DomainMatch};
use crate::routing::mode::{CoordinationMode, ModeSelector};
use crate::routing::tables::RoutingConfig;
use crate::routing::tier::TierClassifier;

/// How much of the hierarchy a batch uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestrationMode {
    /// Every task goes to the lightweight agent.
    Flat,
    /// Every task goes through domain, tier and agent selection.
    Hierarchical,
    /// Single-step tasks go flat, multi-step tasks go hierarchical.
    #[default]
    Hybrid,
}

impl std::fmt::Display for OrchestrationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestrationMode::Flat => write!(f, "flat"),
            OrchestrationMode::Hierarchical => write!(f, "hierarchical"),
            OrchestrationMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for OrchestrationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(OrchestrationMode::Flat),
            "hierarchical" => Ok(OrchestrationMode::Hierarchical),
            "hybrid" => Ok(OrchestrationMode::Hybrid),
            other => Err(format!(
                "unknown mode '{}' (expected flat, hierarchical or hybrid)",
                other
            )),
        }
    }
}

/// Where a task was routed and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub task_id: TaskId,
    pub orchestration_mode: OrchestrationMode,
    pub coordination: CoordinationMode,
    pub domain: Option<String>,
    pub tier: Tier,
    pub agent_role: String,
    /// Domain score plus tier score; zero for lightweight routing.
    pub score: u32,
    pub reason: String,
    /// True when the chosen agent is not an exact (domain, tier) match.
    pub fallback: bool,
}

/// Stateless four-phase router.
#[derive(Debug, Clone)]
pub struct AgentRouter {
    modes: ModeSelector,
    domains: DomainClassifier,
    tiers: TierClassifier,
    lightweight_agent: Option<String>,
}

impl AgentRouter {
    /// Compile the routing tables. Fails only on an invalid pattern.
    pub fn new(config: &RoutingConfig) -> Result<Self> {
        Ok(Self {
            modes: ModeSelector::new(&config.multi_step_patterns)?,
            domains: DomainClassifier::new(config)?,
            tiers: TierClassifier::new(config)?,
            lightweight_agent: config.lightweight_agent.clone(),
        })
    }

    pub fn mode_selector(&self) -> &ModeSelector {
        &self.modes
    }

    pub fn domain_classifier(&self) -> &DomainClassifier {
        &self.domains
    }

    pub fn route(
        &self,
        task: &Task,
        registry: &AgentRegistry,
        mode: OrchestrationMode,
    ) -> RoutingDecision {
        let decision = match mode {
            OrchestrationMode::Flat => {
                self.lightweight(task, registry, mode, "flat mode".to_string())
            }
            OrchestrationMode::Hierarchical => {
                self.hierarchical(task, registry, mode, "hierarchical mode".to_string())
            }
            OrchestrationMode::Hybrid => match self.modes.explain(&task.description) {
                Some(pattern) => self.hierarchical(
                    task,
                    registry,
                    mode,
                    format!("multi-step task (matched {})", pattern),
                ),
                None => self.lightweight(task, registry, mode, "single-step task".to_string()),
            },
        };

        debug!(
            task = %decision.task_id,
            mode = %decision.orchestration_mode,
            coordination = %decision.coordination,
            domain = decision.domain.as_deref().unwrap_or("-"),
            tier = decision.tier.level(),
            agent = %decision.agent_role,
            score = decision.score,
            fallback = decision.fallback,
            reason = %decision.reason,
            "routed task"
        );
        decision
    }

    fn lightweight(
        &self,
        task: &Task,
        registry: &AgentRegistry,
        mode: OrchestrationMode,
        why: String,
    ) -> RoutingDecision {
        let agent = self
            .lightweight_agent
            .as_deref()
            .and_then(|role| registry.get(role))
            .unwrap_or_else(|| registry.default_agent());
        RoutingDecision {
            task_id: task.id.clone(),
            orchestration_mode: mode,
            coordination: CoordinationMode::SingleAgent,
            domain: agent.domain.clone(),
            tier: agent.tier,
            agent_role: agent.role.clone(),
            score: 0,
            reason: format!("{}: lightweight agent", why),
            fallback: false,
        }
    }

    fn hierarchical(
        &self,
        task: &Task,
        registry: &AgentRegistry,
        mode: OrchestrationMode,
        why: String,
    ) -> RoutingDecision {
        let text = task.description.as_str();

        let Some(DomainMatch {
            domain,
            score: domain_score,
            matched: domain_terms,
        }) = self.domains.classify(text)
        else {
            let agent = registry.default_agent();
            return RoutingDecision {
                task_id: task.id.clone(),
                orchestration_mode: mode,
                coordination: CoordinationMode::MultiAgent,
                domain: None,
                tier: agent.tier,
                agent_role: agent.role.clone(),
                score: 0,
                reason: format!("{}; no domain keywords matched, default agent", why),
                fallback: true,
            };
        };

        let tier_match = self.tiers.classify(&domain, text);
        let score = domain_score.saturating_add(tier_match.score);
        let mut reason = format!(
            "{}; domain {} ({}: {}); tier {} ({})",
            why,
            domain,
            domain_score,
            domain_terms.join(", "),
            tier_match.tier.level(),
            if tier_match.matched.is_empty() {
                "no tier keywords".to_string()
            } else {
                tier_match.matched.join(", ")
            }
        );

        match select_agent(registry, &domain, tier_match.tier, text) {
            Some((agent, matches)) => {
                let fallback = agent.tier != tier_match.tier;
                if fallback {
                    reason.push_str(&format!("; nearest tier {} in domain", agent.tier.level()));
                }
                reason.push_str(&format!("; {} capability matches", matches));
                RoutingDecision {
                    task_id: task.id.clone(),
                    orchestration_mode: mode,
                    coordination: CoordinationMode::MultiAgent,
                    domain: Some(domain),
                    tier: agent.tier,
                    agent_role: agent.role.clone(),
                    score,
                    reason,
                    fallback,
                }
            }
            None => {
                let agent = registry.default_agent();
                reason.push_str("; no agent serves the domain, default agent");
                RoutingDecision {
                    task_id: task.id.clone(),
                    orchestration_mode: mode,
                    coordination: CoordinationMode::MultiAgent,
                    domain: Some(domain),
                    tier: agent.tier,
                    agent_role: agent.role.clone(),
                    score,
                    reason,
                    fallback: true,
                }
            }
        }
    }
}

/// Tiers to try for `target`, nearest first. Equal distances prefer the
/// more concrete tier.
pub fn nearest_tiers(target: Tier) -> [Tier; 3] {
    let mut tiers = Tier::ALL;
    tiers.sort_by_key(|t| (t.distance(target), std::cmp::Reverse(t.level())));
    tiers
}

/// Best agent for (domain, tier), widening to other tiers of the domain.
fn select_agent<'a>(
    registry: &'a AgentRegistry,
    domain: &str,
    tier: Tier,
    text: &str,
) -> Option<(&'a Agent, usize)> {
    let text = text.to_lowercase();
    nearest_tiers(tier).into_iter().find_map(|tier| {
        let mut best: Option<(&Agent, usize)> = None;
        for agent in registry.candidates(domain, tier) {
            let matches = capability_matches(agent, &text);
            // Strictly greater keeps the earliest declared agent on ties.
            if best.map_or(true, |(_, m)| matches > m) {
                best = Some((agent, matches));
            }
        }
        best
    })
}

/// Number of the agent's capabilities found in `text` (already lowercased).
///
/// A capability matches when it appears whole, or when every one of its
/// `-`, `_` or space separated tokens appears.
pub fn capability_matches(agent: &Agent, text: &str) -> usize {
    agent
        .capabilities
        .iter()
        .filter(|cap| {
            let cap = cap.to_lowercase();
            if cap.is_empty() {
                return false;
            }
            if text.contains(&cap) {
                return true;
            }
            let tokens: Vec<&str> = cap
                .split(['-', '_', ' '])
                .filter(|t| !t.is_empty())
                .collect();
            tokens.len() > 1 && tokens.iter().all(|t| text.contains(t))
        })
        .count()
}
