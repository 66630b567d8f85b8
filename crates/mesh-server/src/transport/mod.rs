//! Duplex message channels to peers.
//!
//! The node only sees [`Connection`] and [`Dialer`]; the WebSocket types in
//! this module are the production implementations.
//!
//! Closing a connection is the only way to stop a blocked `receive()`: it
//! returns [`TransportError::Closed`] as soon as `close()` is called.

mod dialer;
mod websocket;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mesh_core::{ConnectionId, Message, TransportError};

pub use dialer::WsDialer;
pub use websocket::WsConnection;

/// A live duplex channel to one peer.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Registry key, unique per connection.
    fn id(&self) -> &ConnectionId;

    /// Remote address, used for logs and event payloads.
    fn peer(&self) -> &str;

    /// Write one message and wait for the write to complete.
    async fn send(&self, message: &Message) -> Result<(), TransportError>;

    /// Wait for the next message from the peer.
    async fn receive(&self) -> Result<Message, TransportError>;

    /// Release the channel. Fails with [`TransportError::Closed`] when the
    /// connection was already closed.
    fn close(&self) -> Result<(), TransportError>;

    /// Whether `close()` has been called.
    fn is_closed(&self) -> bool;
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", self.id())
            .field("peer", &self.peer())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opens outbound connections.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connect to `address` (`host:port`) and complete the handshake.
    async fn dial(&self, address: &str) -> Result<Arc<dyn Connection>, TransportError>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory connection and dialer for node tests.

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;

    /// Connection whose inbound side is fed by the test through `inject`.
    pub struct MockConnection {
        id: ConnectionId,
        peer: String,
        inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Message, TransportError>>>,
        feed: mpsc::UnboundedSender<Result<Message, TransportError>>,
        sent: Mutex<Vec<Message>>,
        fail_sends: AtomicBool,
        closed: AtomicBool,
        close_calls: AtomicUsize,
        cancel: CancellationToken,
    }

    impl MockConnection {
        pub fn new(peer: &str) -> Arc<Self> {
            let (feed, inbound) = mpsc::unbounded_channel();
            Arc::new(Self {
                id: ConnectionId::new(),
                peer: peer.to_owned(),
                inbound: tokio::sync::Mutex::new(inbound),
                feed,
                sent: Mutex::new(Vec::new()),
                fail_sends: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                close_calls: AtomicUsize::new(0),
                cancel: CancellationToken::new(),
            })
        }

        pub fn inject(&self, frame: Result<Message, TransportError>) {
            let _ = self.feed.send(frame);
        }

        pub fn fail_sends(&self) {
            self.fail_sends.store(true, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<Message> {
            self.sent.lock().clone()
        }

        pub fn close_calls(&self) -> usize {
            self.close_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connection for MockConnection {
        fn id(&self) -> &ConnectionId {
            &self.id
        }

        fn peer(&self) -> &str {
            &self.peer
        }

        async fn send(&self, message: &Message) -> Result<(), TransportError> {
            if self.is_closed() {
                return Err(TransportError::closed());
            }
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(TransportError::Io("broken pipe".into()));
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }

        async fn receive(&self) -> Result<Message, TransportError> {
            let mut inbound = self.inbound.lock().await;
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(TransportError::closed()),
                frame = inbound.recv() => frame.unwrap_or_else(|| Err(TransportError::closed())),
            }
        }

        fn close(&self) -> Result<(), TransportError> {
            let _ = self.close_calls.fetch_add(1, Ordering::SeqCst);
            if self.closed.swap(true, Ordering::SeqCst) {
                return Err(TransportError::closed());
            }
            self.cancel.cancel();
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    /// How a [`MockDialer`] answers.
    pub enum DialBehavior {
        Connect(Arc<MockConnection>),
        Fail(TransportError),
        Hang,
    }

    pub struct MockDialer {
        behavior: Mutex<Option<DialBehavior>>,
    }

    impl MockDialer {
        pub fn new(behavior: DialBehavior) -> Arc<Self> {
            Arc::new(Self {
                behavior: Mutex::new(Some(behavior)),
            })
        }
    }

    #[async_trait]
    impl Dialer for MockDialer {
        async fn dial(&self, _address: &str) -> Result<Arc<dyn Connection>, TransportError> {
            let behavior = self.behavior.lock().take();
            match behavior {
                Some(DialBehavior::Connect(conn)) => Ok(conn as Arc<dyn Connection>),
                Some(DialBehavior::Fail(err)) => Err(err),
                Some(DialBehavior::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(TransportError::Timeout { timeout_ms: 3_600_000 })
                }
                None => Err(TransportError::Handshake("dialer exhausted".into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockConnection;
    use super::*;

    #[test]
    fn debug_shows_identity_and_state() {
        let conn: Arc<dyn Connection> = MockConnection::new("10.0.0.7:9000");
        let before = format!("{conn:?}");
        assert!(before.contains("10.0.0.7:9000"), "{before}");
        assert!(before.contains("closed: false"), "{before}");

        conn.close().unwrap();
        assert!(format!("{conn:?}").contains("closed: true"));
    }
}
