//! Hybrid mode selection.
//!
//! Decides whether a task reads as a single step that one lightweight agent
//! can handle, or as a multi-step workflow that deserves the full
//! hierarchical routing path.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::task::Task;
use crate::error::Result;

/// How a task should be coordinated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationMode {
    /// One flat default agent handles the task.
    SingleAgent,
    /// The task goes through hierarchical routing.
    MultiAgent,
}

impl std::fmt::Display for CoordinationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinationMode::SingleAgent => write!(f, "single-agent"),
            CoordinationMode::MultiAgent => write!(f, "multi-agent"),
        }
    }
}

/// Textual patterns that imply a multi-step workflow.
pub fn default_multi_step_patterns() -> Vec<String> {
    const VERBS_RESEARCH: &str = r"(research|investigate|analy[sz]e|explore|study|survey)";
    const VERBS_BUILD: &str = r"(implement|build|write|create|code|develop)";
    const VERBS_CHECK: &str = r"(test|verify|validate|deploy|document|review)";
    const SEQUENCE: &str = r"(then|and then|after that|afterwards|followed by|before|once done)";

    vec![
        format!(r"\b{}\b.*\b{}\b.*\b{}\b", VERBS_RESEARCH, SEQUENCE, VERBS_BUILD),
        format!(r"\b{}\b.*\b{}\b.*\b{}\b", VERBS_BUILD, SEQUENCE, VERBS_CHECK),
        format!(r"\b(design|plan|spec out)\b.*\b{}\b.*\b{}\b", SEQUENCE, VERBS_BUILD),
        r"\bfirst\b.*\b(then|next|second)\b".to_string(),
        r"\bstep\s*(1|one)\b".to_string(),
        r"\b(multiple|several) (agents|steps|phases|stages)\b".to_string(),
        r"\bend[- ]to[- ]end\b.*\b(feature|workflow|pipeline)\b".to_string(),
        // Two consecutive numbered items.
        r"(?m)^\s*1[.)]\s+.+\n\s*2[.)]\s+".to_string(),
    ]
}

/// Pure classifier between single- and multi-agent coordination.
#[derive(Debug, Clone)]
pub struct ModeSelector {
    /// Source pattern alongside its compiled form.
    patterns: Vec<(String, Regex)>,
}

impl ModeSelector {
    /// Compile the given patterns. They are matched case-insensitively, with
    /// `.` spanning newlines.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| -> Result<(String, Regex)> {
                Ok((p.clone(), Regex::new(&format!("(?is){}", p))?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn select(&self, task: &Task) -> CoordinationMode {
        self.select_text(&task.description)
    }

    pub fn select_text(&self, description: &str) -> CoordinationMode {
        if self.explain(description).is_some() {
            CoordinationMode::MultiAgent
        } else {
            CoordinationMode::SingleAgent
        }
    }

    /// The first pattern that marks `description` as multi-step, as it was
    /// configured.
    pub fn explain(&self, description: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(description))
            .map(|(source, _)| source.as_str())
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

impl Default for ModeSelector {
    fn default() -> Self {
        // The built-in patterns are known-good.
        Self::new(&default_multi_step_patterns()).unwrap_or(Self {
            patterns: Vec::new(),
        })
    }
}
