// src/core/protocol/mod.rs

//! The coordinator <-> worker wire protocol: message kinds and their framing.

pub mod frame;
pub mod message;
pub use frame::{DEFAULT_MAX_FRAME_SIZE, FrameCodec};
pub use message::WireMessage;
