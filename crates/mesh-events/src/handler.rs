//! Default subscriber: one log line per event.

use async_trait::async_trait;
use mesh_core::{Event, EventKind, EventPayload};
use tracing::{error, info, warn};

use crate::subscriber::Subscribe;

/// Renders every event kind as a structured log line.
///
/// Stateless; failures are logged and never leave the handler.
pub struct LogHandler;

#[async_trait]
impl Subscribe for LogHandler {
    async fn on_event(&self, event: &Event) {
        let kind = event.kind();
        match (kind, event.payload()) {
            (EventKind::Connected, EventPayload::Peer(peer)) => {
                info!(event = %kind, peer = %peer, "connected to peer");
            }
            (EventKind::Disconnected, EventPayload::Peer(peer)) => {
                info!(event = %kind, peer = %peer, "disconnected from peer");
            }
            (EventKind::MessageSent, EventPayload::Peer(peer)) => {
                info!(event = %kind, peer = %peer, "message sent to peer");
            }
            (EventKind::MessageReceived, EventPayload::Received(message)) => {
                info!(event = %kind, content = %message.content, "message received");
            }
            (EventKind::ConnectionTimeout, EventPayload::Peer(peer)) => {
                warn!(event = %kind, peer = %peer, "connection to peer timed out");
            }
            (EventKind::MessageSendFailed, EventPayload::Peer(peer)) => {
                warn!(event = %kind, peer = %peer, "failed to send message to peer");
            }
            (EventKind::MessageFormatError, EventPayload::Diagnostic(detail)) => {
                warn!(event = %kind, error = %detail, "received malformed message");
            }
            (kind, payload) => {
                error!(event = %kind, ?payload, "event payload does not match its kind");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
