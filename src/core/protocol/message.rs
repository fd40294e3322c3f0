// src/core/protocol/message.rs

//! The message kinds exchanged over a worker connection once the handshake is done.

use crate::core::events::Event;
use crate::core::room::RoomId;
use crate::core::rules::Rule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A framed message on a worker connection.
///
/// `Event`, `RegisterRule` and `UnregisterRule` travel from the coordinator to
/// workers; `Result` travels back. The identity token exchanged during the
/// rendezvous is a raw fixed-size prefix and never appears as a `WireMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// An event seen in `source`, to be classified by exactly one worker.
    Event { source: RoomId, event: Event },
    /// A classified event and the destinations it must be published to.
    Result {
        event: Event,
        destinations: BTreeSet<RoomId>,
    },
    /// Broadcast: add a reference to (rule, destination) in `source`'s classifier.
    RegisterRule {
        source: RoomId,
        rule: Rule,
        destination: RoomId,
    },
    /// Broadcast: drop a reference to (rule, destination) in `source`'s classifier.
    UnregisterRule {
        source: RoomId,
        rule: Rule,
        destination: RoomId,
    },
}

impl WireMessage {
    /// A short name for logging and protocol errors.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Event { .. } => "event",
            WireMessage::Result { .. } => "result",
            WireMessage::RegisterRule { .. } => "register_rule",
            WireMessage::UnregisterRule { .. } => "unregister_rule",
        }
    }

    /// Whether the coordinator must deliver this message to every worker.
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            WireMessage::RegisterRule { .. } | WireMessage::UnregisterRule { .. }
        )
    }
}
