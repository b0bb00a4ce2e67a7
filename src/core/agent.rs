//! Agent model and the read-only agent registry.
//!
//! Agents are role-scoped executors arranged in a three-tier hierarchy:
//! an orchestrator at Tier 1, domain leads at Tier 2, and specialists at
//! Tier 3. The registry is built once at startup and shared read-only.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Role used as the fallback agent when the registry file names none.
pub const DEFAULT_AGENT_ROLE: &str = "generalist";

/// Hierarchy level of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    /// Planning and orchestration.
    Orchestration = 1,
    /// Domain leads doing design-level work.
    DomainLead = 2,
    /// Specialists that implement.
    Specialist = 3,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Orchestration, Tier::DomainLead, Tier::Specialist];

    pub fn level(self) -> u8 {
        self as u8
    }

    /// The tier an agent's parent must have, if any.
    pub fn parent_tier(self) -> Option<Tier> {
        match self {
            Tier::Orchestration => None,
            Tier::DomainLead => Some(Tier::Orchestration),
            Tier::Specialist => Some(Tier::DomainLead),
        }
    }

    /// Distance between two tiers, used for nearest-tier fallback.
    pub fn distance(self, other: Tier) -> u8 {
        self.level().abs_diff(other.level())
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::Orchestration),
            2 => Ok(Tier::DomainLead),
            3 => Ok(Tier::Specialist),
            other => Err(format!("tier must be 1, 2 or 3, got {}", other)),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.level()
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Orchestration => write!(f, "tier-1 (orchestration)"),
            Tier::DomainLead => write!(f, "tier-2 (domain lead)"),
            Tier::Specialist => write!(f, "tier-3 (specialist)"),
        }
    }
}

/// A role-scoped executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Role name, unique within its tier.
    pub role: String,
    pub tier: Tier,
    /// Role of the agent one tier up that may delegate to this one.
    #[serde(default)]
    pub parent: Option<String>,
    /// Capability strings matched against task descriptions.
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

impl Agent {
    pub fn new(role: &str, tier: Tier) -> Self {
        Self {
            role: role.to_string(),
            tier,
            parent: None,
            capabilities: Vec::new(),
            domain: None,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        for cap in capabilities {
            if !self.capabilities.iter().any(|c| c == cap) {
                self.capabilities.push(cap.to_string());
            }
        }
        self
    }

    pub fn serves(&self, domain: &str, tier: Tier) -> bool {
        self.tier == tier && self.domain.as_deref() == Some(domain)
    }
}

/// On-disk layout of an agents file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub default_agent: Option<String>,
    #[serde(default, rename = "agent")]
    pub agents: Vec<Agent>,
}

/// Validated, ordered collection of agents.
///
/// Declaration order is preserved; the router uses it to break ties.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
    default_index: usize,
}

impl AgentRegistry {
    /// Build a registry, checking the hierarchy invariants.
    ///
    /// # Errors
    /// Returns `InvalidRegistry` if the list is empty, a role repeats within a
    /// tier, a parent link is missing or points at the wrong tier, or the
    /// default role is not present.
    pub fn new(agents: Vec<Agent>, default_role: &str) -> Result<Self> {
        if agents.is_empty() {
            return Err(Error::InvalidRegistry("no agents configured".to_string()));
        }

        let mut seen = HashSet::new();
        for agent in &agents {
            if agent.role.trim().is_empty() {
                return Err(Error::InvalidRegistry("agent with empty role".to_string()));
            }
            if !seen.insert((agent.tier, agent.role.as_str())) {
                return Err(Error::InvalidRegistry(format!(
                    "role {} declared twice in {}",
                    agent.role, agent.tier
                )));
            }
        }

        for agent in &agents {
            match (agent.tier.parent_tier(), agent.parent.as_deref()) {
                (None, Some(parent)) => {
                    return Err(Error::InvalidRegistry(format!(
                        "tier-1 agent {} must not have a parent (found {})",
                        agent.role, parent
                    )));
                }
                (Some(Tier::DomainLead), None) => {
                    return Err(Error::InvalidRegistry(format!(
                        "tier-3 agent {} has no parent",
                        agent.role
                    )));
                }
                (Some(expected), Some(parent)) => {
                    let found = agents
                        .iter()
                        .any(|a| a.role == parent && a.tier == expected);
                    if !found {
                        return Err(Error::InvalidRegistry(format!(
                            "agent {} names parent {} which is not a {} agent",
                            agent.role, parent, expected
                        )));
                    }
                }
                // Tier-2 agents may stand alone.
                _ => {}
            }
        }

        let default_index = agents
            .iter()
            .position(|a| a.role == default_role)
            .ok_or_else(|| {
                Error::InvalidRegistry(format!("default agent {} is not registered", default_role))
            })?;

        Ok(Self {
            agents,
            default_index,
        })
    }

    /// Load a registry from a TOML file.
    ///
    /// ```toml
    /// default_agent = "generalist"
    ///
    /// [[agent]]
    /// role = "orchestrator"
    /// tier = 1
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading agent registry");
        let file: RegistryFile = toml::from_str(&fs::read_to_string(path)?)?;
        Self::from_file(file)
    }

    pub fn from_file(file: RegistryFile) -> Result<Self> {
        let default_role = file
            .default_agent
            .unwrap_or_else(|| DEFAULT_AGENT_ROLE.to_string());
        Self::new(file.agents, &default_role)
    }

    /// The built-in roster: one orchestrator, a lead per domain, and
    /// specialists under each lead.
    pub fn builtin() -> Self {
        let agents = vec![
            Agent::new("orchestrator", Tier::Orchestration)
                .with_capabilities(&["planning", "roadmap", "decomposition", "coordination"]),
            Agent::new(DEFAULT_AGENT_ROLE, Tier::DomainLead)
                .with_parent("orchestrator")
                .with_capabilities(&["general", "question", "summary", "explain"]),
            Agent::new("frontend-lead", Tier::DomainLead)
                .with_parent("orchestrator")
                .with_domain("frontend")
                .with_capabilities(&["ui design", "component architecture", "design system"]),
            Agent::new("backend-lead", Tier::DomainLead)
                .with_parent("orchestrator")
                .with_domain("backend")
                .with_capabilities(&["api design", "schema design", "service architecture"]),
            Agent::new("qa-lead", Tier::DomainLead)
                .with_parent("orchestrator")
                .with_domain("testing")
                .with_capabilities(&["test strategy", "test plan", "quality"]),
            Agent::new("research-lead", Tier::DomainLead)
                .with_parent("orchestrator")
                .with_domain("research")
                .with_capabilities(&["evaluation", "comparison", "trade-off"]),
            Agent::new("devops-lead", Tier::DomainLead)
                .with_parent("orchestrator")
                .with_domain("devops")
                .with_capabilities(&["infrastructure design", "release process", "capacity"]),
            Agent::new("ui-developer", Tier::Specialist)
                .with_parent("frontend-lead")
                .with_domain("frontend")
                .with_capabilities(&["react", "css", "component", "accessibility", "layout"]),
            Agent::new("api-developer", Tier::Specialist)
                .with_parent("backend-lead")
                .with_domain("backend")
                .with_capabilities(&["rest", "endpoint", "api", "auth", "graphql"]),
            Agent::new("database-engineer", Tier::Specialist)
                .with_parent("backend-lead")
                .with_domain("backend")
                .with_capabilities(&["database", "sql", "migration", "index", "query"]),
            Agent::new("tester", Tier::Specialist)
                .with_parent("qa-lead")
                .with_domain("testing")
                .with_capabilities(&["unit test", "integration test", "e2e", "coverage", "fixture"]),
            Agent::new("researcher", Tier::Specialist)
                .with_parent("research-lead")
                .with_domain("research")
                .with_capabilities(&["research", "investigate", "survey", "benchmark", "summarize"]),
            Agent::new("infra-engineer", Tier::Specialist)
                .with_parent("devops-lead")
                .with_domain("devops")
                .with_capabilities(&["docker", "kubernetes", "ci", "pipeline", "terraform"]),
        ];

        // The roster above satisfies every invariant checked by `new`.
        let default_index = agents
            .iter()
            .position(|a| a.role == DEFAULT_AGENT_ROLE)
            .unwrap_or(0);
        Self {
            agents,
            default_index,
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// The designated fallback agent.
    pub fn default_agent(&self) -> &Agent {
        &self.agents[self.default_index]
    }

    /// First agent with the given role, in declaration order.
    pub fn get(&self, role: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.role == role)
    }

    /// The agent with `role` at `tier`. Roles are only unique within a tier.
    pub fn find(&self, role: &str, tier: Tier) -> Option<&Agent> {
        self.agents
            .iter()
            .find(|a| a.tier == tier && a.role == role)
    }

    /// Agents serving `domain` at `tier`, in declaration order.
    pub fn candidates<'a, 'b>(
        &'a self,
        domain: &'b str,
        tier: Tier,
    ) -> impl Iterator<Item = &'a Agent> + 'b
    where
        'a: 'b,
    {
        self.agents.iter().filter(move |a| a.serves(domain, tier))
    }

    /// Agents that declare `role` as their parent.
    pub fn children<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a Agent> + 'a {
        self.agents
            .iter()
            .filter(move |a| a.parent.as_deref() == Some(role))
    }

    /// Distinct domains in declaration order.
    pub fn domains(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for domain in self.agents.iter().filter_map(|a| a.domain.as_deref()) {
            if !out.contains(&domain) {
                out.push(domain);
            }
        }
        out
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
