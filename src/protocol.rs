use serde_json::Value;
use static_assertions::{const_assert, const_assert_eq};
use thiserror::Error;

use crate::link::MAX_PAYLOAD_SIZE;

/// Little-endian `u16` action length at the start of every command record.
pub const COMMAND_HEADER_SIZE: usize = 2;
/// Longest action a single link payload can carry, in bytes.
pub const MAX_ACTION_LEN: usize = MAX_PAYLOAD_SIZE - COMMAND_HEADER_SIZE;

pub const ACTION_FIELD: &str = "action";

const_assert_eq!(COMMAND_HEADER_SIZE + MAX_ACTION_LEN, MAX_PAYLOAD_SIZE);
const_assert!(MAX_ACTION_LEN <= u16::MAX as usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("payload size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("malformed input")]
    MalformedInput,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` is not a string")]
    InvalidField(&'static str),
    #[error("action of {len} bytes exceeds the {limit}-byte link limit")]
    ActionTooLong { len: usize, limit: usize },
    #[error("serialization failed")]
    SerializationError,
}

/// An operator command for the remote peer.
///
/// Any string is a valid action, including the empty string, and it is
/// carried unchanged. On the link a command is a record of the action length
/// followed by exactly that many UTF-8 bytes:
///
/// ```text
/// +-----------------+------------------------+
/// | len (u16 LE)    | action (len bytes)     |
/// +-----------------+------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    action: String,
}

impl CommandMessage {
    pub fn new(action: impl Into<String>) -> Self {
        Self { action: action.into() }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Size of the record [`CommandMessage::encode_binary`] produces.
    pub fn encoded_len(&self) -> usize {
        COMMAND_HEADER_SIZE + self.action.len()
    }

    /// Parse a client text message of the form `{"action": "<string>"}`.
    ///
    /// Other fields are ignored. Fails with `MalformedInput` when the text is
    /// not JSON, `MissingField` when there is no action field, and
    /// `InvalidField` when the action is not a string. The action's content
    /// and length are never checked.
    pub fn decode_structured(text: &str) -> Result<Self, ProtocolError> {
        let document: Value =
            serde_json::from_str(text).map_err(|_| ProtocolError::MalformedInput)?;

        match document.get(ACTION_FIELD) {
            None => Err(ProtocolError::MissingField(ACTION_FIELD)),
            Some(Value::String(action)) => Ok(Self::new(action.as_str())),
            Some(_) => Err(ProtocolError::InvalidField(ACTION_FIELD)),
        }
    }

    /// Encode as a link record. Only fails when the action cannot fit in one
    /// link payload.
    pub fn encode_binary(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = self.action.as_bytes();
        let len = u16::try_from(bytes.len())
            .ok()
            .filter(|len| usize::from(*len) <= MAX_ACTION_LEN)
            .ok_or(ProtocolError::ActionTooLong { len: bytes.len(), limit: MAX_ACTION_LEN })?;

        let mut record = Vec::with_capacity(self.encoded_len());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(bytes);
        Ok(record)
    }

    /// Decode a link record. The length header must match the record size exactly.
    pub fn decode_binary(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < COMMAND_HEADER_SIZE {
            return Err(ProtocolError::SizeMismatch {
                expected: COMMAND_HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let (header, body) = bytes.split_at(COMMAND_HEADER_SIZE);
        let len = usize::from(u16::from_le_bytes([header[0], header[1]]));
        if body.len() != len {
            return Err(ProtocolError::SizeMismatch {
                expected: COMMAND_HEADER_SIZE + len,
                actual: bytes.len(),
            });
        }

        let action = core::str::from_utf8(body).map_err(|_| ProtocolError::MalformedInput)?;
        Ok(Self::new(action))
    }
}
