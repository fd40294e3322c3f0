// src/core/rules/mod.rs

//! Routing rules and the per-source reference-counted classifier.
//!
//! A `Rule` decides whether an event travels from a source room to a given
//! destination. Rules are plain serializable data so they can be shipped to
//! worker processes, and they compare structurally so that the same logical
//! rule registered by several sessions is counted as one entry.

use crate::core::events::Event;
use serde::{Deserialize, Serialize};
use wildmatch::WildMatch;

pub mod classifier;
pub mod parser;

pub use classifier::Classifier;

/// The pluggable predicate interface the classifier evaluates.
pub trait Predicate {
    fn matches(&self, event: &Event) -> bool;
}

/// A routing rule as registered by a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rule {
    /// Matches every event.
    Anything,
    /// Matches the events accepted by the given specification.
    Match(RuleSpec),
}

impl Rule {
    /// Resolves an optional rule the way sessions do: no rule means "everything".
    pub fn or_anything(rule: Option<Rule>) -> Rule {
        rule.unwrap_or(Rule::Anything)
    }

    /// Parses the textual rule form; see [`parser`] for the grammar.
    pub fn parse(text: &str) -> Result<Rule, crate::core::RoomGraphError> {
        Ok(Rule::Match(text.parse()?))
    }
}

impl Predicate for Rule {
    fn matches(&self, event: &Event) -> bool {
        match self {
            Rule::Anything => true,
            Rule::Match(spec) => spec.matches(event),
        }
    }
}

/// A serializable specification of an attribute predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleSpec {
    /// The event carries `value` under `key`.
    Equals { key: String, value: String },
    /// Some value under `key` matches a `*`/`?` wildcard pattern.
    Glob { key: String, pattern: String },
    /// The event has at least one value under `key`.
    HasKey(String),
    /// `value` appears under any key.
    Contains(String),
    And(Vec<RuleSpec>),
    Or(Vec<RuleSpec>),
    Not(Box<RuleSpec>),
}

impl RuleSpec {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        RuleSpec::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn glob(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        RuleSpec::Glob {
            key: key.into(),
            pattern: pattern.into(),
        }
    }
}

impl Predicate for RuleSpec {
    fn matches(&self, event: &Event) -> bool {
        match self {
            RuleSpec::Equals { key, value } => event.contains(key, value),
            RuleSpec::Glob { key, pattern } => {
                let pattern = WildMatch::new(pattern);
                event.values(key).any(|value| pattern.matches(value))
            }
            RuleSpec::HasKey(key) => event.values(key).next().is_some(),
            RuleSpec::Contains(value) => event.all_values().any(|v| v == value),
            RuleSpec::And(specs) => specs.iter().all(|spec| spec.matches(event)),
            RuleSpec::Or(specs) => specs.iter().any(|spec| spec.matches(event)),
            RuleSpec::Not(spec) => !spec.matches(event),
        }
    }
}
