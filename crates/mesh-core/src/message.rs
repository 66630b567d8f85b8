//! The wire message exchanged between peers.

use serde::{Deserialize, Serialize};

use crate::errors::TransportError;

/// A single text message: `{ "content": "<string>" }` on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message body.
    pub content: String,
}

impl Message {
    /// Create a message from any string-like content.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Encode to the JSON wire form.
    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Malformed {
            detail: e.to_string(),
        })
    }

    /// Decode from JSON bytes.
    ///
    /// Anything that is not an object with a string `content` field is a
    /// [`TransportError::Malformed`]. Extra fields are ignored.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(bytes).map_err(|e| TransportError::Malformed {
            detail: e.to_string(),
        })
    }
}
