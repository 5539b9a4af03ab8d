//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol: a 4-byte
//! little-endian length prefix followed by a `bincode`-encoded payload,
//! matching the length-prefix convention used throughout storage (WAL
//! records, SSTable blocks).

use super::{Command, Response};
use crate::error::Result;

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(value)?;
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < 4 {
        return Err(crate::error::CoreError::Protocol(
            "frame shorter than length prefix".into(),
        ));
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let payload = bytes.get(4..4 + len).ok_or_else(|| {
        crate::error::CoreError::Protocol("frame shorter than declared length".into())
    })?;
    Ok(bincode::deserialize(payload)?)
}

/// Encode a command to its wire frame.
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    encode(command)
}

/// Decode a command from a complete wire frame.
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    decode(bytes)
}

/// Encode a response to its wire frame.
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    encode(response)
}

/// Decode a response from a complete wire frame.
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    decode(bytes)
}

/// Number of bytes declared by a frame's length prefix, once at least the
/// prefix itself has arrived. Callers read this many more bytes before
/// calling [`decode_command`]/[`decode_response`].
pub fn frame_len(prefix: &[u8; 4]) -> usize {
    u32::from_le_bytes(*prefix) as usize
}
