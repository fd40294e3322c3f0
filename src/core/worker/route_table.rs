// src/core/worker/route_table.rs

//! The state a worker owns: one classifier per source room.

use crate::core::RoomGraphError;
use crate::core::protocol::WireMessage;
use crate::core::room::RoomId;
use crate::core::rules::Classifier;
use std::collections::HashMap;

/// Per-worker routing state, driven one message at a time.
///
/// The table knows nothing about sockets or rooms' join state; it only maps
/// source identifiers to classifiers and answers classification requests.
#[derive(Debug, Default)]
pub struct RouteTable {
    sources: HashMap<RoomId, Classifier>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one message and returns the reply to send back, if any.
    pub fn handle(&mut self, message: WireMessage) -> Result<Option<WireMessage>, RoomGraphError> {
        match message {
            WireMessage::Event { source, event } => {
                // No classifier yet means nobody routes from this source.
                let Some(classifier) = self.sources.get(&source) else {
                    return Ok(None);
                };
                let destinations = classifier.classify(&event);
                if destinations.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(WireMessage::Result {
                        event,
                        destinations,
                    }))
                }
            }
            WireMessage::RegisterRule {
                source,
                rule,
                destination,
            } => {
                self.sources
                    .entry(source)
                    .or_default()
                    .register(rule, destination);
                Ok(None)
            }
            WireMessage::UnregisterRule {
                source,
                rule,
                destination,
            } => {
                if let Some(classifier) = self.sources.get_mut(&source) {
                    classifier.unregister(&rule, &destination)?;
                    if classifier.is_empty() {
                        self.sources.remove(&source);
                    }
                }
                Ok(None)
            }
            other => Err(RoomGraphError::UnknownMessageKind(other.kind().to_string())),
        }
    }

    pub fn classifier(&self, source: &RoomId) -> Option<&Classifier> {
        self.sources.get(source)
    }

    /// The number of sources that currently have at least one rule.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}
