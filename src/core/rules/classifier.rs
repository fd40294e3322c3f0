// src/core/rules/classifier.rs

//! The per-source, reference-counted rule table.

use super::{Predicate, Rule};
use crate::core::RoomGraphError;
use crate::core::events::Event;
use crate::core::room::RoomId;
use std::collections::{BTreeSet, HashMap};

/// Maps (rule, destination) pairs to the number of registrations holding them.
///
/// A pair whose count drops to zero is removed, never stored with a zero count,
/// so `is_empty` is true exactly when nothing is registered.
#[derive(Debug, Default, Clone)]
pub struct Classifier {
    rules: HashMap<Rule, HashMap<RoomId, usize>>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one reference to the (rule, destination) pair, creating it if absent.
    pub fn register(&mut self, rule: Rule, destination: RoomId) {
        *self
            .rules
            .entry(rule)
            .or_default()
            .entry(destination)
            .or_insert(0) += 1;
    }

    /// Drops one reference to the (rule, destination) pair.
    ///
    /// Unregistering a pair that holds no references breaks the caller's
    /// contract and is reported as `UnregisterWithoutRegister`.
    pub fn unregister(&mut self, rule: &Rule, destination: &RoomId) -> Result<(), RoomGraphError> {
        let missing = || RoomGraphError::UnregisterWithoutRegister {
            destination: destination.to_string(),
        };

        let destinations = self.rules.get_mut(rule).ok_or_else(missing)?;
        let count = destinations.get_mut(destination).ok_or_else(missing)?;
        *count -= 1;

        if *count == 0 {
            destinations.remove(destination);
            if destinations.is_empty() {
                self.rules.remove(rule);
            }
        }
        Ok(())
    }

    /// Returns every destination reachable through a rule that matches `event`.
    pub fn classify(&self, event: &Event) -> BTreeSet<RoomId> {
        self.rules
            .iter()
            .filter(|(rule, _)| rule.matches(event))
            .flat_map(|(_, destinations)| destinations.keys().cloned())
            .collect()
    }

    /// The current reference count of a pair; zero when absent.
    pub fn count(&self, rule: &Rule, destination: &RoomId) -> usize {
        self.rules
            .get(rule)
            .and_then(|destinations| destinations.get(destination))
            .copied()
            .unwrap_or(0)
    }

    /// The number of distinct (rule, destination) pairs.
    pub fn len(&self) -> usize {
        self.rules.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
