//! Error hierarchy for the mesh node.
//!
//! - [`TransportError`]: failures of a single duplex channel (send, receive,
//!   handshake), classified so the read loop can tell a finished connection
//!   from a malformed payload
//! - [`NodeError`]: failures of node-level operations (accepting or dialing
//!   a peer)
//!
//! Nothing here is fatal to the process. Fatal startup errors (missing
//! listen address, bind failure) live in the binary and use `anyhow`.

use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// TransportError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of a single connection operation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The channel was closed, locally or by the peer.
    #[error("connection closed{}", close_suffix(.code, .reason))]
    Closed {
        /// WebSocket close code, when the peer sent one.
        code: Option<u16>,
        /// Close reason, possibly empty.
        reason: String,
    },

    /// The underlying socket failed.
    #[error("transport I/O error: {0}")]
    Io(String),

    /// The peer violated the framing protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Inbound data did not decode to a message.
    #[error("malformed message: {detail}")]
    Malformed {
        /// Decoder diagnostic.
        detail: String,
    },

    /// The transport gave up waiting (for example on TCP connect).
    #[error("timed out after {timeout_ms}ms")]
    Timeout {
        /// Elapsed budget in milliseconds.
        timeout_ms: u64,
    },

    /// The opening handshake (upgrade or dial) failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
}

fn close_suffix(code: &Option<u16>, reason: &str) -> String {
    match (*code, reason.is_empty()) {
        (Some(code), true) => format!(" (code {code})"),
        (Some(code), false) => format!(" (code {code}: {reason})"),
        (None, false) => format!(" ({reason})"),
        (None, true) => String::new(),
    }
}

impl TransportError {
    /// A local close with no code or reason.
    #[must_use]
    pub fn closed() -> Self {
        Self::Closed {
            code: None,
            reason: String::new(),
        }
    }

    /// Whether a receive failure means the connection itself is finished
    /// (closed, reset, protocol violation) rather than a bad payload.
    ///
    /// Only [`TransportError::Malformed`] is a payload problem.
    #[must_use]
    pub fn is_connection_ended(&self) -> bool {
        !matches!(self, Self::Malformed { .. })
    }

    /// Whether this error is a handshake timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NodeError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of a node-level operation.
#[derive(Debug, Error)]
pub enum NodeError {
    /// An inbound upgrade failed before a connection existed.
    #[error("inbound handshake failed: {0}")]
    Accept(#[source] TransportError),

    /// Dialing a peer failed for a reason other than a timeout.
    #[error("failed to connect to {address}: {source}")]
    Dial {
        /// Target address as given by the caller.
        address: String,
        /// Transport failure.
        #[source]
        source: TransportError,
    },

    /// Dialing a peer exceeded the handshake timeout.
    #[error("connecting to {address} timed out after {timeout_ms}ms")]
    Timeout {
        /// Target address as given by the caller.
        address: String,
        /// Handshake budget in milliseconds.
        timeout_ms: u64,
    },
}
