//! Outbound WebSocket dialer.

use std::sync::Arc;

use async_trait::async_trait;
use mesh_core::TransportError;
use tokio::net::TcpStream;
use tracing::debug;

use super::{Connection, Dialer, WsConnection};

/// Dials `ws://{address}{ws_path}` with `tokio-tungstenite`.
///
/// Carries no timeout of its own; the node bounds every dial.
pub struct WsDialer {
    ws_path: String,
}

impl WsDialer {
    /// Dialer targeting `ws_path` on every peer.
    pub fn new(ws_path: impl Into<String>) -> Self {
        Self {
            ws_path: ws_path.into(),
        }
    }

    fn url(&self, address: &str) -> String {
        format!("ws://{address}{}", self.ws_path)
    }
}

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self, address: &str) -> Result<Arc<dyn Connection>, TransportError> {
        let tcp = TcpStream::connect(address)
            .await
            .map_err(|e| TransportError::Handshake(format!("tcp connect: {e}")))?;
        let peer = tcp
            .peer_addr()
            .map_or_else(|_| address.to_owned(), |addr| addr.to_string());

        let url = self.url(address);
        debug!(%url, "websocket handshake");
        let (ws, _response) = tokio_tungstenite::client_async(url, tcp)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        Ok(Arc::new(WsConnection::from_tungstenite(ws, peer)))
    }
}
