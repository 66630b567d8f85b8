//! Lifecycle events emitted by the node.
//!
//! An [`Event`] pairs a closed [`EventKind`] with a payload whose shape is
//! fixed by the kind:
//!
//! | kind                   | payload                       |
//! |------------------------|-------------------------------|
//! | `connected`            | [`EventPayload::Peer`]        |
//! | `disconnected`         | [`EventPayload::Peer`]        |
//! | `message_sent`         | [`EventPayload::Peer`]        |
//! | `message_received`     | [`EventPayload::Received`]    |
//! | `connection_timeout`   | [`EventPayload::Peer`]        |
//! | `message_send_failed`  | [`EventPayload::Peer`]        |
//! | `message_format_error` | [`EventPayload::Diagnostic`]  |
//!
//! Fields are private and events are only built through the per-kind
//! constructors, so a mismatched pair cannot be created.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Closed set of lifecycle event kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A peer connection was registered.
    Connected,
    /// A peer connection was released.
    Disconnected,
    /// A broadcast reached one peer.
    MessageSent,
    /// A message arrived from a peer.
    MessageReceived,
    /// Dialing a peer exceeded the handshake timeout.
    ConnectionTimeout,
    /// A broadcast to one peer failed.
    MessageSendFailed,
    /// Inbound data could not be decoded.
    MessageFormatError,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Connected,
        Self::Disconnected,
        Self::MessageSent,
        Self::MessageReceived,
        Self::ConnectionTimeout,
        Self::MessageSendFailed,
        Self::MessageFormatError,
    ];

    /// Wire / log name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::MessageSent => "message_sent",
            Self::MessageReceived => "message_received",
            Self::ConnectionTimeout => "connection_timeout",
            Self::MessageSendFailed => "message_send_failed",
            Self::MessageFormatError => "message_format_error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload carried by an [`Event`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EventPayload {
    /// Peer identity (remote address, or the dial target for timeouts).
    Peer(String),
    /// A decoded inbound message.
    Received(Message),
    /// Opaque diagnostic text for format errors.
    Diagnostic(String),
}

/// An immutable lifecycle notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Event {
    kind: EventKind,
    payload: EventPayload,
    timestamp: DateTime<Utc>,
}

impl Event {
    fn peer(kind: EventKind, peer: impl Into<String>) -> Self {
        Self {
            kind,
            payload: EventPayload::Peer(peer.into()),
            timestamp: Utc::now(),
        }
    }

    /// A connection to `peer` was registered.
    pub fn connected(peer: impl Into<String>) -> Self {
        Self::peer(EventKind::Connected, peer)
    }

    /// The connection to `peer` was released.
    pub fn disconnected(peer: impl Into<String>) -> Self {
        Self::peer(EventKind::Disconnected, peer)
    }

    /// A broadcast was written to `peer`.
    pub fn message_sent(peer: impl Into<String>) -> Self {
        Self::peer(EventKind::MessageSent, peer)
    }

    /// A broadcast to `peer` failed.
    pub fn message_send_failed(peer: impl Into<String>) -> Self {
        Self::peer(EventKind::MessageSendFailed, peer)
    }

    /// Dialing `address` exceeded the handshake timeout.
    pub fn connection_timeout(address: impl Into<String>) -> Self {
        Self::peer(EventKind::ConnectionTimeout, address)
    }

    /// A message was received.
    pub fn message_received(message: Message) -> Self {
        Self {
            kind: EventKind::MessageReceived,
            payload: EventPayload::Received(message),
            timestamp: Utc::now(),
        }
    }

    /// Inbound data failed to decode.
    pub fn message_format_error(diagnostic: impl Into<String>) -> Self {
        Self {
            kind: EventKind::MessageFormatError,
            payload: EventPayload::Diagnostic(diagnostic.into()),
            timestamp: Utc::now(),
        }
    }

    /// Event kind.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Event payload.
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// When the transition happened.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Peer identity, for the kinds that carry one.
    pub fn peer_identity(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Peer(peer) => Some(peer),
            _ => None,
        }
    }
}
