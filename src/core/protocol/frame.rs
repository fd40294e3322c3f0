// src/core/protocol/frame.rs

//! Length-prefixed framing for `WireMessage`s.
//!
//! Each frame is a 4-byte big-endian payload length followed by exactly that
//! many bytes of bincode-serialized message.

use super::WireMessage;
use crate::core::RoomGraphError;
use bincode::config;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// The size of the big-endian length prefix.
const LENGTH_PREFIX_LEN: usize = 4;

/// Frames above this size are refused unless the codec is configured otherwise.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A `tokio_util::codec` implementation for encoding and decoding `WireMessage`s.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Serializes `message` into one complete frame, prefix included.
    ///
    /// Broadcasts encode once with this and hand the same bytes to every worker.
    pub fn encode_frame(&self, message: &WireMessage) -> Result<Bytes, RoomGraphError> {
        let mut buf = BytesMut::new();
        self.write_frame(message, &mut buf)?;
        Ok(buf.freeze())
    }

    fn write_frame(&self, message: &WireMessage, dst: &mut BytesMut) -> Result<(), RoomGraphError> {
        let payload = bincode::serde::encode_to_vec(message, config::standard())?;
        let size = payload.len();
        if size > self.max_frame_size || size > u32::MAX as usize {
            return Err(RoomGraphError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        dst.reserve(LENGTH_PREFIX_LEN + size);
        dst.put_u32(size as u32);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

impl Encoder<WireMessage> for FrameCodec {
    type Error = RoomGraphError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.write_frame(&item, dst)
    }
}

impl Decoder for FrameCodec {
    type Item = WireMessage;
    type Error = RoomGraphError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
        let size = u32::from_be_bytes(prefix) as usize;
        if size > self.max_frame_size {
            return Err(RoomGraphError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        let total = LENGTH_PREFIX_LEN + size;
        if src.len() < total {
            // Make room for the rest of the frame to avoid repeated reallocation.
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        let payload = src.split_to(size);
        let (message, read) =
            bincode::serde::decode_from_slice::<WireMessage, _>(&payload, config::standard())?;
        if read != size {
            return Err(RoomGraphError::Decode(format!(
                "{} trailing bytes after {} message",
                size - read,
                message.kind()
            )));
        }
        Ok(Some(message))
    }

    /// At end of stream, leftover bytes mean the peer stopped mid-frame.
    /// An empty buffer is a clean close.
    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(message) => Ok(Some(message)),
            None if buf.is_empty() => Ok(None),
            None => Err(RoomGraphError::TruncatedStream),
        }
    }
}
