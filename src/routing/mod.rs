//! Routing: which agent handles a task.

pub mod domain;
pub mod keywords;
pub mod mode;
pub mod router;
pub mod tables;
pub mod tier;

pub use domain::{DomainClassifier, DomainMatch};
pub use keywords::{KeywordScore, KeywordTable, WeightedKeyword};
pub use mode::{CoordinationMode, ModeSelector};
pub use router::{AgentRouter, OrchestrationMode, RoutingDecision};
pub use tables::{DomainRule, RoutingConfig, TierKeywords};
pub use tier::{TierClassifier, TierMatch};
