//! Session message framing.
//!
//! `Raw` is the default and has no framing at all: the bytes returned by one
//! read are one message. `LengthPrefixed` puts a 4-byte big-endian length in
//! front of every payload so messages survive TCP coalescing and splitting.
//! Both peers of a link must use the same mode.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Largest payload accepted in `LengthPrefixed` mode.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

const LEN_PREFIX: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    #[default]
    Raw,
    LengthPrefixed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    TooLarge(usize),
}

impl Framing {
    /// Encode one outgoing message.
    pub fn encode(&self, text: &str) -> Result<Bytes, FrameError> {
        match self {
            Framing::Raw => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Framing::LengthPrefixed => {
                let payload = text.as_bytes();
                if payload.len() > MAX_FRAME_LEN {
                    return Err(FrameError::TooLarge(payload.len()));
                }
                let mut buf = BytesMut::with_capacity(LEN_PREFIX + payload.len());
                buf.put_u32(payload.len() as u32);
                buf.put_slice(payload);
                Ok(buf.freeze())
            }
        }
    }

    /// Pull the next complete message out of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Consumed bytes are
    /// removed from `buf`; a partial frame is left in place.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<String>, FrameError> {
        match self {
            Framing::Raw => {
                if buf.is_empty() {
                    return Ok(None);
                }
                let chunk = buf.split();
                Ok(Some(decode_text(&chunk)))
            }
            Framing::LengthPrefixed => {
                if buf.len() < LEN_PREFIX {
                    return Ok(None);
                }
                let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
                if len > MAX_FRAME_LEN {
                    return Err(FrameError::TooLarge(len));
                }
                if buf.len() < LEN_PREFIX + len {
                    buf.reserve(LEN_PREFIX + len - buf.len());
                    return Ok(None);
                }
                buf.advance(LEN_PREFIX);
                let payload = buf.split_to(len);
                Ok(Some(decode_text(&payload)))
            }
        }
    }
}

/// Decode received bytes as UTF-8, replacing invalid sequences, and drop
/// trailing newlines.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\n')
        .to_string()
}
