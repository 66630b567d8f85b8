//! Broadcast node: accepts and dials peers, pumps their inbound messages,
//! and fans local text out to every registered connection.
//!
//! ## Connection lifecycle
//!
//! ```text
//!   accept_incoming / connect_to
//!        │ registry.insert ─► dispatch(connected) ─► spawn read loop
//!        ▼
//!   read loop: receive() ─► dispatch(message_received)  (repeat)
//!        │ Err(Malformed) ─► dispatch(message_format_error)
//!        │ Err(closed / io / protocol) ─► log only
//!        ▼
//!   Registration::drop ─► registry.remove ─► close ─► dispatch(disconnected)
//! ```
//!
//! `broadcast` and `shutdown` may remove and close a connection first; the
//! read loop then sees `Closed` and the release above still runs once.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use mesh_core::{Event, Message, NodeError, TransportError};
use mesh_events::EventBus;
use tracing::{debug, info, warn};

use crate::registry::ConnectionRegistry;
use crate::transport::{Connection, Dialer};

/// Default budget for an outbound dial.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Node tuning.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Bound on `connect_to`, covering TCP connect and the WebSocket handshake.
    pub handshake_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Per-connection outcome counts of one [`Node::broadcast`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sends that completed.
    pub sent: usize,
    /// Sends that failed; those connections were removed and closed.
    pub failed: usize,
    /// Connections removed by someone else before their send started.
    pub skipped: usize,
}

/// A mesh peer: server and client at once.
pub struct Node {
    address: String,
    registry: Arc<ConnectionRegistry>,
    bus: Arc<EventBus>,
    dialer: Arc<dyn Dialer>,
    config: NodeConfig,
}

impl Node {
    /// Create a node listening (externally) on `address`.
    pub fn new(
        address: impl Into<String>,
        bus: Arc<EventBus>,
        dialer: Arc<dyn Dialer>,
        config: NodeConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            address: address.into(),
            registry: Arc::new(ConnectionRegistry::new()),
            bus,
            dialer,
            config,
        })
    }

    /// Local listen address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Peer identities of registered connections.
    pub fn peers(&self) -> Vec<String> {
        self.registry.peers()
    }

    /// Take ownership of an inbound connection once the transport finished
    /// (or failed) its upgrade.
    ///
    /// A failed upgrade is logged and reported without any event.
    pub fn accept_incoming(
        &self,
        handshake: Result<Arc<dyn Connection>, TransportError>,
    ) -> Result<Arc<dyn Connection>, NodeError> {
        match handshake {
            Ok(conn) => {
                info!(peer = conn.peer(), conn_id = %conn.id(), "accepted inbound connection");
                self.register(Arc::clone(&conn));
                Ok(conn)
            }
            Err(e) => {
                warn!(error = %e, "inbound handshake failed");
                Err(NodeError::Accept(e))
            }
        }
    }

    /// Dial `address`, bounded by the handshake timeout.
    ///
    /// Only a timeout dispatches `connection_timeout`; other failures are
    /// logged and returned.
    pub async fn connect_to(&self, address: &str) -> Result<Arc<dyn Connection>, NodeError> {
        let budget = self.config.handshake_timeout;
        let timeout_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        info!(address, timeout_ms, "connecting to peer");

        let outcome = match tokio::time::timeout(budget, self.dialer.dial(address)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(TransportError::Timeout { timeout_ms }),
        };

        match outcome {
            Ok(conn) => {
                info!(address, peer = conn.peer(), conn_id = %conn.id(), "connected to peer");
                self.register(Arc::clone(&conn));
                Ok(conn)
            }
            Err(e) if e.is_timeout() => {
                warn!(address, timeout_ms, "connection attempt timed out");
                self.bus.dispatch(Event::connection_timeout(address));
                Err(NodeError::Timeout {
                    address: address.to_owned(),
                    timeout_ms,
                })
            }
            Err(e) => {
                warn!(address, error = %e, "failed to connect to peer");
                Err(NodeError::Dial {
                    address: address.to_owned(),
                    source: e,
                })
            }
        }
    }

    /// Send `content` to every registered connection.
    ///
    /// Works on a snapshot; a connection registered during the call may or
    /// may not be included.
    pub async fn broadcast(&self, content: &str) -> BroadcastReport {
        let message = Message::new(content);
        let targets = self.registry.snapshot();
        debug!(recipients = targets.len(), "broadcasting message");

        let outcomes = join_all(targets.iter().map(|conn| self.send_to(conn, &message))).await;

        let mut report = BroadcastReport::default();
        for outcome in outcomes {
            match outcome {
                SendOutcome::Sent => report.sent += 1,
                SendOutcome::Failed => report.failed += 1,
                SendOutcome::Skipped => report.skipped += 1,
            }
        }
        report
    }

    async fn send_to(&self, conn: &Arc<dyn Connection>, message: &Message) -> SendOutcome {
        if !self.registry.contains(conn.id()) {
            debug!(peer = conn.peer(), "connection left before send, skipping");
            return SendOutcome::Skipped;
        }
        match conn.send(message).await {
            Ok(()) => {
                self.bus.dispatch(Event::message_sent(conn.peer()));
                SendOutcome::Sent
            }
            Err(e) => {
                warn!(peer = conn.peer(), error = %e, "send failed, dropping connection");
                self.bus.dispatch(Event::message_send_failed(conn.peer()));
                if let Some(removed) = self.registry.remove(conn.id()) {
                    close_quietly(removed.as_ref());
                }
                SendOutcome::Failed
            }
        }
    }

    /// Close every registered connection. Individual close failures are
    /// logged and do not stop the rest.
    pub fn shutdown(&self) {
        let drained = self.registry.drain();
        info!(connections = drained.len(), "closing all peer connections");
        for conn in drained {
            if let Err(e) = conn.close() {
                warn!(peer = conn.peer(), error = %e, "failed to close connection");
            }
        }
    }

    fn register(&self, conn: Arc<dyn Connection>) {
        self.registry.insert(Arc::clone(&conn));
        self.bus.dispatch(Event::connected(conn.peer()));
        let registration = Registration {
            registry: Arc::clone(&self.registry),
            bus: Arc::clone(&self.bus),
            conn,
        };
        let _ = tokio::spawn(read_loop(registration));
    }
}

enum SendOutcome {
    Sent,
    Failed,
    Skipped,
}

/// Holds a connection's place in the registry for the life of its read
/// loop. Dropping it releases the connection exactly once, on every exit
/// path of the loop (including a panic).
struct Registration {
    registry: Arc<ConnectionRegistry>,
    bus: Arc<EventBus>,
    conn: Arc<dyn Connection>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let peer = self.conn.peer();
        let _ = self.registry.remove(self.conn.id());
        close_quietly(self.conn.as_ref());
        info!(peer, conn_id = %self.conn.id(), "peer connection released");
        self.bus.dispatch(Event::disconnected(peer));
    }
}

async fn read_loop(registration: Registration) {
    let conn = &registration.conn;
    loop {
        match conn.receive().await {
            Ok(message) => {
                debug!(peer = conn.peer(), "message received");
                registration.bus.dispatch(Event::message_received(message));
            }
            Err(TransportError::Malformed { detail }) => {
                warn!(peer = conn.peer(), error = %detail, "malformed inbound message");
                registration.bus.dispatch(Event::message_format_error(detail));
                break;
            }
            Err(e @ TransportError::Closed { .. }) => {
                debug!(peer = conn.peer(), reason = %e, "connection closed");
                break;
            }
            Err(e) => {
                warn!(peer = conn.peer(), error = %e, "connection ended unexpectedly");
                break;
            }
        }
    }
}

/// Close, tolerating a connection someone else already closed.
fn close_quietly(conn: &dyn Connection) {
    if let Err(e) = conn.close() {
        debug!(peer = conn.peer(), error = %e, "connection already closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use mesh_core::{EventKind, EventPayload};
    use mesh_events::ChannelSubscriber;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use crate::transport::mock::{DialBehavior, MockConnection, MockDialer};

    const WAIT: Duration = Duration::from_secs(2);

    fn bus_with_channel() -> (Arc<EventBus>, UnboundedReceiver<Arc<Event>>) {
        let bus = EventBus::new();
        let (sub, rx) = ChannelSubscriber::new();
        bus.register_all(sub);
        (Arc::new(bus), rx)
    }

    fn node_with(dialer: DialBehavior) -> (Arc<Node>, UnboundedReceiver<Arc<Event>>) {
        let (bus, rx) = bus_with_channel();
        let node = Node::new(
            "127.0.0.1:9000",
            bus,
            MockDialer::new(dialer),
            NodeConfig::default(),
        );
        (node, rx)
    }

    fn node() -> (Arc<Node>, UnboundedReceiver<Arc<Event>>) {
        node_with(DialBehavior::Fail(TransportError::Handshake("unused".into())))
    }

    async fn next_event(rx: &mut UnboundedReceiver<Arc<Event>>) -> Arc<Event> {
        timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Events arrive from independent tasks, so collect `n` and sort by kind.
    async fn next_events(rx: &mut UnboundedReceiver<Arc<Event>>, n: usize) -> Vec<Arc<Event>> {
        let mut events = Vec::with_capacity(n);
        for _ in 0..n {
            events.push(next_event(rx).await);
        }
        events
    }

    fn count(events: &[Arc<Event>], kind: EventKind) -> usize {
        events.iter().filter(|e| e.kind() == kind).count()
    }

    async fn assert_quiet(rx: &mut UnboundedReceiver<Arc<Event>>) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(rx.try_recv().is_err(), "unexpected extra event");
    }

    // ── accept ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn accept_registers_and_dispatches_connected() {
        let (node, mut rx) = node();
        let conn = MockConnection::new("10.0.0.2:5000");

        let accepted = node.accept_incoming(Ok(conn.clone())).unwrap();
        assert_eq!(accepted.peer(), "10.0.0.2:5000");
        assert_eq!(node.connection_count(), 1);
        assert_eq!(node.peers(), vec!["10.0.0.2:5000"]);

        let event = next_event(&mut rx).await;
        assert_eq!(event.kind(), EventKind::Connected);
        assert_eq!(event.peer_identity(), Some("10.0.0.2:5000"));
    }

    #[tokio::test]
    async fn failed_accept_registers_nothing_and_emits_nothing() {
        let (node, mut rx) = node();
        let result = node.accept_incoming(Err(TransportError::Handshake("bad upgrade".into())));
        assert_matches!(result, Err(NodeError::Accept(TransportError::Handshake(_))));
        assert_eq!(node.connection_count(), 0);
        assert_quiet(&mut rx).await;
    }

    // ── read loop ───────────────────────────────────────────────────

    #[tokio::test]
    async fn inbound_messages_are_dispatched() {
        let (node, mut rx) = node();
        let conn = MockConnection::new("peer");
        let _ = node.accept_incoming(Ok(conn.clone())).unwrap();
        let _ = next_event(&mut rx).await;

        conn.inject(Ok(Message::new("hello")));
        let event = next_event(&mut rx).await;
        assert_eq!(event.kind(), EventKind::MessageReceived);
        assert_matches!(event.payload(), EventPayload::Received(m) if m.content == "hello");
        assert_eq!(node.connection_count(), 1);
    }

    #[tokio::test]
    async fn malformed_inbound_dispatches_one_format_error_then_disconnects() {
        let (node, mut rx) = node();
        let conn = MockConnection::new("peer");
        let _ = node.accept_incoming(Ok(conn.clone())).unwrap();
        let _ = next_event(&mut rx).await;

        conn.inject(Err(TransportError::Malformed {
            detail: "missing field `content`".into(),
        }));
        conn.inject(Ok(Message::new("never read")));

        let events = next_events(&mut rx, 2).await;
        assert_eq!(count(&events, EventKind::MessageFormatError), 1);
        assert_eq!(count(&events, EventKind::Disconnected), 1);
        assert_eq!(count(&events, EventKind::MessageReceived), 0);
        let format_error = events
            .iter()
            .find(|e| e.kind() == EventKind::MessageFormatError)
            .unwrap();
        assert_matches!(format_error.payload(), EventPayload::Diagnostic(d) if d.contains("content"));

        assert_eq!(node.connection_count(), 0);
        assert!(conn.is_closed());
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn abnormal_closure_logs_only_then_disconnects() {
        let (node, mut rx) = node();
        let conn = MockConnection::new("peer");
        let _ = node.accept_incoming(Ok(conn.clone())).unwrap();
        let _ = next_event(&mut rx).await;

        conn.inject(Err(TransportError::Io("connection reset".into())));

        let event = next_event(&mut rx).await;
        assert_eq!(event.kind(), EventKind::Disconnected);
        assert_eq!(event.peer_identity(), Some("peer"));
        assert_eq!(node.connection_count(), 0);
        assert_eq!(conn.close_calls(), 1);
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn peer_close_releases_exactly_once() {
        let (node, mut rx) = node();
        let conn = MockConnection::new("peer");
        let _ = node.accept_incoming(Ok(conn.clone())).unwrap();
        let _ = next_event(&mut rx).await;

        conn.inject(Err(TransportError::Closed {
            code: Some(1000),
            reason: String::new(),
        }));

        let event = next_event(&mut rx).await;
        assert_eq!(event.kind(), EventKind::Disconnected);
        assert_quiet(&mut rx).await;
        assert!(conn.is_closed());
    }

    // ── connect ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn connect_registers_and_dispatches_connected() {
        let conn = MockConnection::new("127.0.0.1:9001");
        let (node, mut rx) = node_with(DialBehavior::Connect(conn.clone()));

        let dialed = node.connect_to("127.0.0.1:9001").await.unwrap();
        assert_eq!(dialed.id(), conn.id());
        assert_eq!(node.connection_count(), 1);

        let event = next_event(&mut rx).await;
        assert_eq!(event.kind(), EventKind::Connected);
        assert_eq!(event.peer_identity(), Some("127.0.0.1:9001"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_dial_times_out_with_one_event() {
        let (node, mut rx) = node_with(DialBehavior::Hang);

        let result = node.connect_to("10.255.255.1:9000").await;
        assert_matches!(
            result,
            Err(NodeError::Timeout { ref address, timeout_ms: 5000 }) if address == "10.255.255.1:9000"
        );
        assert_eq!(node.connection_count(), 0);

        let event = next_event(&mut rx).await;
        assert_eq!(event.kind(), EventKind::ConnectionTimeout);
        assert_eq!(event.peer_identity(), Some("10.255.255.1:9000"));
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn dialer_reported_timeout_is_a_timeout() {
        let (node, mut rx) =
            node_with(DialBehavior::Fail(TransportError::Timeout { timeout_ms: 10 }));
        let result = node.connect_to("peer:1").await;
        assert_matches!(result, Err(NodeError::Timeout { .. }));
        assert_eq!(next_event(&mut rx).await.kind(), EventKind::ConnectionTimeout);
    }

    #[tokio::test]
    async fn other_dial_failures_emit_nothing() {
        let (node, mut rx) =
            node_with(DialBehavior::Fail(TransportError::Handshake("refused".into())));
        let result = node.connect_to("peer:1").await;
        assert_matches!(result, Err(NodeError::Dial { ref address, .. }) if address == "peer:1");
        assert_eq!(node.connection_count(), 0);
        assert_quiet(&mut rx).await;
    }

    // ── broadcast ───────────────────────────────────────────────────

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let (node, mut rx) = node();
        let a = MockConnection::new("a");
        let b = MockConnection::new("b");
        let _ = node.accept_incoming(Ok(a.clone())).unwrap();
        let _ = node.accept_incoming(Ok(b.clone())).unwrap();
        let _ = next_events(&mut rx, 2).await;

        let report = node.broadcast("hello").await;
        assert_eq!(report, BroadcastReport { sent: 2, failed: 0, skipped: 0 });
        assert_eq!(a.sent(), vec![Message::new("hello")]);
        assert_eq!(b.sent(), vec![Message::new("hello")]);

        let events = next_events(&mut rx, 2).await;
        assert_eq!(count(&events, EventKind::MessageSent), 2);
        let mut peers: Vec<_> = events.iter().filter_map(|e| e.peer_identity()).collect();
        peers.sort_unstable();
        assert_eq!(peers, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn broadcast_with_no_connections_is_empty() {
        let (node, mut rx) = node();
        assert_eq!(node.broadcast("nobody").await, BroadcastReport::default());
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn failed_send_removes_only_that_connection() {
        let (node, mut rx) = node();
        let good = MockConnection::new("good");
        let dead = MockConnection::new("dead");
        let _ = node.accept_incoming(Ok(good.clone())).unwrap();
        let _ = node.accept_incoming(Ok(dead.clone())).unwrap();
        let _ = next_events(&mut rx, 2).await;
        dead.fail_sends();

        let report = node.broadcast("ping").await;
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(node.peers(), vec!["good"]);
        assert!(dead.is_closed());

        // message_sent(good), message_send_failed(dead), disconnected(dead)
        let events = next_events(&mut rx, 3).await;
        assert_eq!(count(&events, EventKind::MessageSent), 1);
        assert_eq!(count(&events, EventKind::MessageSendFailed), 1);
        assert_eq!(count(&events, EventKind::Disconnected), 1);
        let failed = events
            .iter()
            .find(|e| e.kind() == EventKind::MessageSendFailed)
            .unwrap();
        assert_eq!(failed.peer_identity(), Some("dead"));
        assert_quiet(&mut rx).await;

        // The dead peer is no longer referenced.
        let report = node.broadcast("again").await;
        assert_eq!(report, BroadcastReport { sent: 1, failed: 0, skipped: 0 });
        let event = next_event(&mut rx).await;
        assert_eq!(event.kind(), EventKind::MessageSent);
        assert_eq!(event.peer_identity(), Some("good"));
    }

    // ── shutdown ────────────────────────────────────────────────────

    #[tokio::test]
    async fn shutdown_closes_everything_once() {
        let (node, mut rx) = node();
        let a = MockConnection::new("a");
        let b = MockConnection::new("b");
        let _ = node.accept_incoming(Ok(a.clone())).unwrap();
        let _ = node.accept_incoming(Ok(b.clone())).unwrap();
        let _ = next_events(&mut rx, 2).await;

        node.shutdown();
        assert_eq!(node.connection_count(), 0);
        assert!(a.is_closed());
        assert!(b.is_closed());

        let events = next_events(&mut rx, 2).await;
        assert_eq!(count(&events, EventKind::Disconnected), 2);
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn shutdown_continues_past_close_failures() {
        let (node, _rx) = node();
        let a = MockConnection::new("a");
        let b = MockConnection::new("b");
        let _ = node.accept_incoming(Ok(a.clone())).unwrap();
        let _ = node.accept_incoming(Ok(b.clone())).unwrap();
        // Already closed: shutdown's close() on `a` fails.
        a.close().unwrap();

        node.shutdown();
        assert!(b.is_closed());
        assert_eq!(node.connection_count(), 0);
    }

    #[tokio::test]
    async fn registry_never_holds_closed_connections() {
        let (node, _rx) = node();
        let conns: Vec<_> = (0..16)
            .map(|i| MockConnection::new(&format!("peer-{i}")))
            .collect();
        for conn in &conns {
            let _ = node.accept_incoming(Ok(conn.clone())).unwrap();
        }
        for conn in conns.iter().step_by(2) {
            conn.fail_sends();
        }
        for conn in conns.iter().skip(1).step_by(4) {
            conn.inject(Err(TransportError::Io("reset".into())));
        }

        let _ = node.broadcast("x").await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        for conn in node.registry.snapshot() {
            assert!(!conn.is_closed(), "registered connection {} is closed", conn.peer());
        }
    }

    #[test]
    fn default_config_uses_five_second_handshake() {
        assert_eq!(NodeConfig::default().handshake_timeout, Duration::from_secs(5));
    }
}
