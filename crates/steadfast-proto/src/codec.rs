//! Wire framing: `[u32 length, native byte order][UTF-8 JSON body]`
//!
//! The decoder validates the prefix before waiting for the body, so an
//! oversized or empty frame is rejected as soon as its four length bytes
//! arrive. A rejected prefix is left in the buffer untouched.

use crate::error::{ProtocolError, Result};
use bytes::{Buf, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

/// Hard cap on a single frame body
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

const PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_bytes: usize,
}

impl FrameCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        FrameCodec { max_frame_bytes }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len == 0 {
            Err(ProtocolError::EmptyFrame)
        } else if len > self.max_frame_bytes {
            Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame_bytes,
            })
        } else {
            Ok(())
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if src.len() < PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&src[..PREFIX_LEN]);
        let len = u32::from_ne_bytes(prefix) as usize;
        self.check_len(len)?;

        let needed = PREFIX_LEN + len;
        if src.len() < needed {
            src.reserve(needed - src.len());
            return Ok(None);
        }

        src.advance(PREFIX_LEN);
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<()> {
        self.check_len(body.len())?;
        dst.reserve(PREFIX_LEN + body.len());
        dst.extend_from_slice(&(body.len() as u32).to_ne_bytes());
        dst.extend_from_slice(&body);
        Ok(())
    }
}

/// Parse a frame body, which must be a JSON object
pub fn parse_body(body: &[u8]) -> Result<Value> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(ProtocolError::NotAnObject)
    }
}

/// Serialize a value into a frame body
pub fn to_body<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}
