// src/core/transport/adapter.rs

use super::{Stanza, StanzaAdapter};
use crate::core::RoomGraphError;
use crate::core::events::Event;
use bytes::Bytes;
use tracing::debug;

/// Stanza bodies are JSON objects mapping each key to an array of strings,
/// e.g. `{"ip": ["1.2.3.4"], "type": ["spam"]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStanzaAdapter;

impl StanzaAdapter for JsonStanzaAdapter {
    fn to_event(&self, stanza: &Stanza) -> Option<Event> {
        match serde_json::from_slice::<Event>(&stanza.body) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(
                    "Ignoring non-event stanza from '{}' in '{}': {}",
                    stanza.sender, stanza.room, e
                );
                None
            }
        }
    }

    fn to_body(&self, event: &Event) -> Result<Bytes, RoomGraphError> {
        serde_json::to_vec(event)
            .map(Bytes::from)
            .map_err(|e| RoomGraphError::Encode(e.to_string()))
    }
}
