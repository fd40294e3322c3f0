// src/core/errors.rs

//! Defines the primary error type for the routing core.

use std::sync::Arc;
use thiserror::Error;

/// Every failure the coordinator, the worker pool, or a worker process can report.
///
/// `std::io::Error` is wrapped in an `Arc` so the whole enum stays cheaply cloneable,
/// which lets a single fatal error fan out to every task waiting on the router.
#[derive(Error, Debug, Clone)]
pub enum RoomGraphError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// The peer closed the stream in the middle of a frame.
    #[error("Stream ended before a complete frame was received")]
    TruncatedStream,

    #[error("Frame of {size} bytes exceeds the limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    /// A rendezvous connection presented an identity outside the expected set.
    #[error("Unknown worker identity '{0}'")]
    UnknownWorker(String),

    #[error("Only {connected} of {expected} workers connected before the startup deadline")]
    StartupTimeout { expected: usize, connected: usize },

    /// A (rule, destination) pair was unregistered more often than it was registered.
    #[error("Unregistered a rule for destination '{destination}' that was never registered")]
    UnregisterWithoutRegister { destination: String },

    #[error("Unexpected message kind '{0}'")]
    UnknownMessageKind(String),

    #[error("Worker connection lost")]
    WorkerDisconnected,

    #[error("Operation stopped before completion")]
    Stopped,

    #[error("Invalid room name: {0}")]
    InvalidRoom(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Room transport error: {0}")]
    Transport(String),

    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl PartialEq for RoomGraphError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RoomGraphError::Io(e1), RoomGraphError::Io(e2)) => e1.to_string() == e2.to_string(),
            (
                RoomGraphError::FrameTooLarge { size: s1, max: m1 },
                RoomGraphError::FrameTooLarge { size: s2, max: m2 },
            ) => s1 == s2 && m1 == m2,
            (RoomGraphError::Encode(s1), RoomGraphError::Encode(s2)) => s1 == s2,
            (RoomGraphError::Decode(s1), RoomGraphError::Decode(s2)) => s1 == s2,
            (RoomGraphError::UnknownWorker(s1), RoomGraphError::UnknownWorker(s2)) => s1 == s2,
            (
                RoomGraphError::StartupTimeout {
                    expected: e1,
                    connected: c1,
                },
                RoomGraphError::StartupTimeout {
                    expected: e2,
                    connected: c2,
                },
            ) => e1 == e2 && c1 == c2,
            (
                RoomGraphError::UnregisterWithoutRegister { destination: d1 },
                RoomGraphError::UnregisterWithoutRegister { destination: d2 },
            ) => d1 == d2,
            (RoomGraphError::UnknownMessageKind(s1), RoomGraphError::UnknownMessageKind(s2)) => {
                s1 == s2
            }
            (RoomGraphError::InvalidRoom(s1), RoomGraphError::InvalidRoom(s2)) => s1 == s2,
            (RoomGraphError::InvalidRule(s1), RoomGraphError::InvalidRule(s2)) => s1 == s2,
            (RoomGraphError::Transport(s1), RoomGraphError::Transport(s2)) => s1 == s2,
            (RoomGraphError::Spawn(s1), RoomGraphError::Spawn(s2)) => s1 == s2,
            (RoomGraphError::Internal(s1), RoomGraphError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for RoomGraphError {
    fn from(e: std::io::Error) -> Self {
        RoomGraphError::Io(Arc::new(e))
    }
}

impl From<bincode::error::EncodeError> for RoomGraphError {
    fn from(e: bincode::error::EncodeError) -> Self {
        RoomGraphError::Encode(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for RoomGraphError {
    fn from(e: bincode::error::DecodeError) -> Self {
        RoomGraphError::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for RoomGraphError {
    fn from(e: serde_json::Error) -> Self {
        RoomGraphError::Decode(e.to_string())
    }
}

impl From<tokio::task::JoinError> for RoomGraphError {
    fn from(e: tokio::task::JoinError) -> Self {
        RoomGraphError::Internal(format!("routing task failed: {e}"))
    }
}
