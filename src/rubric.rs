//! Quality rubric - checks that a response mentions every required section.
//!
//! Detection is a case-insensitive substring search over a table of trigger
//! phrases. It is deliberately loose: "source" alone satisfies "Sources".

use std::collections::HashSet;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::{RefinrError, Result};

/// One named content requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricItem {
    /// Display name, e.g. "Top 3 trends"
    pub name: String,
    /// Any of these (lowercase) substrings marks the item satisfied
    pub triggers: Vec<String>,
    /// What the rewriter should ask for when the item is missing
    #[serde(default)]
    pub hint: String,
}

impl RubricItem {
    pub fn new<S: Into<String>>(name: impl Into<String>, triggers: impl IntoIterator<Item = S>, hint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triggers: triggers.into_iter().map(|t| Into::<String>::into(t).to_lowercase()).collect(),
            hint: hint.into(),
        }
    }

    /// `lowered` must already be lowercase
    fn is_satisfied(&self, lowered: &str) -> bool {
        self.triggers.iter().any(|t| lowered.contains(t.as_str()))
    }
}

/// Pass/fail for one rubric item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCheck {
    pub name: String,
    pub passed: bool,
}

/// Per-item results for one response, in rubric order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationResult {
    checks: Vec<ItemCheck>,
}

impl EvaluationResult {
    pub fn new(checks: Vec<ItemCheck>) -> Self {
        Self { checks }
    }

    /// Build from (name, passed) pairs
    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, bool)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, passed)| ItemCheck {
                    name: name.into(),
                    passed,
                })
                .collect(),
        )
    }

    /// Overall success: every item passed
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Names of the items that failed, in rubric order
    pub fn failed(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Result for a named item
    pub fn get(&self, name: &str) -> Option<bool> {
        self.checks.iter().find(|c| c.name == name).map(|c| c.passed)
    }

    pub fn checks(&self) -> &[ItemCheck] {
        &self.checks
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl std::fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .checks
            .iter()
            .map(|c| format!("{}: {}", c.name, c.passed))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

// Serialized as an ordered name -> bool map
impl Serialize for EvaluationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.checks.len()))?;
        for check in &self.checks {
            map.serialize_entry(&check.name, &check.passed)?;
        }
        map.end()
    }
}

/// Scores a response against a set of requirements
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, response: &str) -> EvaluationResult;
}

/// A fixed table of rubric items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rubric {
    items: Vec<RubricItem>,
}

impl Rubric {
    /// Create a rubric; every item needs a unique name and at least one trigger
    pub fn new(items: Vec<RubricItem>) -> Result<Self> {
        if items.is_empty() {
            return Err(RefinrError::InvalidConfig("rubric must have at least one item".to_string()));
        }

        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(items.len());
        for item in items {
            if item.name.trim().is_empty() {
                return Err(RefinrError::InvalidConfig("rubric item name is empty".to_string()));
            }
            if !seen.insert(item.name.clone()) {
                return Err(RefinrError::InvalidConfig(format!(
                    "rubric item '{}' is listed more than once",
                    item.name
                )));
            }
            let triggers: Vec<String> = item
                .triggers
                .iter()
                .map(|t| t.to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            if triggers.is_empty() {
                return Err(RefinrError::InvalidConfig(format!(
                    "rubric item '{}' has no trigger phrases",
                    item.name
                )));
            }
            normalized.push(RubricItem { triggers, ..item });
        }

        Ok(Self { items: normalized })
    }

    /// The market-research brief rubric
    pub fn market_research() -> Self {
        Self {
            items: default_items(),
        }
    }

    pub fn items(&self) -> &[RubricItem] {
        &self.items
    }

    /// Rewrite hint for a named item
    pub fn hint(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.hint.as_str())
            .filter(|h| !h.is_empty())
    }
}

impl Default for Rubric {
    fn default() -> Self {
        Self::market_research()
    }
}

impl Evaluator for Rubric {
    fn evaluate(&self, response: &str) -> EvaluationResult {
        let lowered = response.to_lowercase();
        EvaluationResult::new(
            self.items
                .iter()
                .map(|item| ItemCheck {
                    name: item.name.clone(),
                    passed: item.is_satisfied(&lowered),
                })
                .collect(),
        )
    }
}

/// Default market-research items
pub fn default_items() -> Vec<RubricItem> {
    vec![
        RubricItem::new(
            "Top 3 trends",
            ["top 3 trends", "top 3"],
            "Give the top 3 trends as numbered bullets.",
        ),
        RubricItem::new(
            "Competitor analysis",
            ["competitor analysis", "competitor"],
            "Include competitor analysis (3 competitors, 1-line each).",
        ),
        RubricItem::new(
            "Actionable insight",
            ["actionable insight", "actionable"],
            "Provide a single clear actionable recommendation for product or GTM.",
        ),
        RubricItem::new(
            "Sources",
            ["source", "sources"],
            "List the types of sources used (e.g., industry reports, product pages).",
        ),
    ]
}
