// src/core/pool/identity.rs

//! Worker identity tokens and the fixed-size rendezvous exchange.

use crate::core::RoomGraphError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;
use uuid::Uuid;

/// Every identity is exactly this many ASCII hex characters on the wire.
pub const IDENTITY_LEN: usize = 32;

/// A one-time token that lets the pool recognise the worker it spawned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerIdentity(String);

impl WorkerIdentity {
    pub fn generate() -> Self {
        WorkerIdentity(Uuid::new_v4().simple().to_string())
    }

    /// Generates `count` identities, none equal to another.
    pub fn generate_distinct(count: usize) -> Vec<Self> {
        let mut seen = HashSet::with_capacity(count);
        let mut identities = Vec::with_capacity(count);
        while identities.len() < count {
            let identity = Self::generate();
            if seen.insert(identity.clone()) {
                identities.push(identity);
            }
        }
        identities
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Writes the identity as the first bytes of a fresh worker connection.
pub async fn send_identity<W>(stream: &mut W, identity: &WorkerIdentity) -> Result<(), RoomGraphError>
where
    W: AsyncWrite + Unpin,
{
    if identity.as_bytes().len() != IDENTITY_LEN {
        return Err(RoomGraphError::UnknownWorker(identity.to_string()));
    }
    stream.write_all(identity.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads the fixed-size identity a worker sends right after connecting.
pub async fn recv_identity<R>(stream: &mut R, timeout: Duration) -> Result<WorkerIdentity, RoomGraphError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; IDENTITY_LEN];
    match time::timeout(timeout, stream.read_exact(&mut buf)).await {
        Err(_) => Err(RoomGraphError::Io(std::sync::Arc::new(std::io::Error::new(
            ErrorKind::TimedOut,
            "worker did not send its identity in time",
        )))),
        Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => Err(RoomGraphError::TruncatedStream),
        Ok(Err(e)) => Err(e.into()),
        Ok(Ok(_)) => match std::str::from_utf8(&buf) {
            Ok(s) => Ok(WorkerIdentity(s.to_string())),
            Err(_) => Err(RoomGraphError::UnknownWorker(
                String::from_utf8_lossy(&buf).into_owned(),
            )),
        },
    }
}
