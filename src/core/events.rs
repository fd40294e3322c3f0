// src/core/events.rs

//! Defines `Event`, the structured abuse report that flows between rooms.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// An ordered multi-map from attribute key to a set of string values.
///
/// Keys keep their first-insertion order and each key's values keep insertion
/// order; adding a value that is already present under the same key is a no-op.
/// Equality is structural and ignores ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    attrs: IndexMap<String, IndexSet<String>>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` under `key`. Returns `false` if the pair was already present.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        self.attrs
            .entry(key.into())
            .or_default()
            .insert(value.into())
    }

    /// Builder-style variant of [`Event::add`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(key, value);
        self
    }

    /// Iterates over the values stored under `key`, in insertion order.
    pub fn values<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.attrs
            .get(key)
            .into_iter()
            .flat_map(|values| values.iter().map(String::as_str))
    }

    /// Iterates over every value of every key.
    pub fn all_values(&self) -> impl Iterator<Item = &str> {
        self.attrs
            .values()
            .flat_map(|values| values.iter().map(String::as_str))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.attrs
            .get(key)
            .is_some_and(|values| values.contains(value))
    }

    /// The number of distinct keys.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexSet<String>)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K, V> FromIterator<(K, V)> for Event
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut event = Event::new();
        for (key, value) in iter {
            event.add(key, value);
        }
        event
    }
}
