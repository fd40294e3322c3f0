// src/core/mod.rs

//! The central module containing the core logic and data structures of RoomGraph.

pub mod dispatch;
pub mod errors;
pub mod events;
pub mod pool;
pub mod protocol;
pub mod room;
pub mod router;
pub mod rules;
pub mod session;
pub mod transport;
pub mod worker;

pub use errors::RoomGraphError;
pub use events::Event;
pub use room::RoomId;
pub use router::RoomGraph;
pub use rules::{Predicate, Rule, RuleSpec};
pub use session::{SessionHandle, SessionManager};
