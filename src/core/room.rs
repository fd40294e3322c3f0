// src/core/room.rs

//! Room identifiers: normalized names of pub/sub channels.

use crate::core::RoomGraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A normalized room address.
///
/// Names are trimmed and lowercased so that `"Abuse.Raw"` and `" abuse.raw "`
/// refer to the same subscription, classifier source, and destination tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(name: &str) -> Result<Self, RoomGraphError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(RoomGraphError::InvalidRoom(
                "room name cannot be empty".to_string(),
            ));
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(RoomGraphError::InvalidRoom(format!(
                "room name '{trimmed}' contains whitespace or control characters"
            )));
        }
        Ok(RoomId(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomId {
    type Err = RoomGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoomId::parse(s)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
