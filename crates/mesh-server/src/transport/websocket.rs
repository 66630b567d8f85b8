//! WebSocket-backed [`Connection`].
//!
//! ```text
//!   send() ──► mpsc ──► writer task ──► sink      (ack via oneshot)
//!   receive() ◄──────────────────────── stream    (ping/pong skipped)
//!   close() ──► cancel token ──► writer emits Close and stops,
//!                                pending send() and receive() return Closed
//! ```
//!
//! A peer that stops reading stalls the writer on `sink.send`; cancellation
//! is raced against that write so `close()` always releases a blocked
//! `send()`.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use mesh_core::{ConnectionId, Message, TransportError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::Connection;

/// Outbound queue depth per connection.
const OUTBOUND_CAPACITY: usize = 64;

/// Budget for the Close frame once the writer is stopping.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

enum Outgoing {
    Text(String),
    Close,
}

/// `None` marks a control frame that `receive` skips.
type Inbound = Option<Result<Message, TransportError>>;

type FrameSink = Pin<Box<dyn Sink<Outgoing, Error = TransportError> + Send>>;
type FrameStream = Pin<Box<dyn Stream<Item = Inbound> + Send>>;

struct Outbound {
    text: String,
    ack: oneshot::Sender<Result<(), TransportError>>,
}

/// A peer connection over a WebSocket, either accepted by the axum router
/// or dialed with `tokio-tungstenite`.
pub struct WsConnection {
    id: ConnectionId,
    peer: String,
    outbound: mpsc::Sender<Outbound>,
    inbound: Mutex<FrameStream>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl WsConnection {
    /// Wrap a socket upgraded by axum.
    pub fn from_axum(socket: WebSocket, peer: impl Into<String>) -> Self {
        let (sink, stream) = socket.split();
        let sink = sink
            .with(|out: Outgoing| {
                future::ready(Ok::<_, axum::Error>(match out {
                    Outgoing::Text(text) => AxumMessage::Text(text.into()),
                    Outgoing::Close => AxumMessage::Close(None),
                }))
            })
            .sink_map_err(|e| TransportError::Io(e.to_string()));
        let stream = stream.map(|item| match item {
            Ok(frame) => decode_axum(frame),
            Err(e) => Some(Err(TransportError::Io(e.to_string()))),
        });
        Self::spawn(Box::pin(sink), Box::pin(stream), peer.into())
    }

    /// Wrap a `tokio-tungstenite` stream (client side of a dial, or any
    /// server-side stream accepted outside axum).
    pub fn from_tungstenite<S>(ws: WebSocketStream<S>, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        let sink = sink
            .with(|out: Outgoing| {
                future::ready(Ok::<_, WsError>(match out {
                    Outgoing::Text(text) => WsMessage::Text(text.into()),
                    Outgoing::Close => WsMessage::Close(None),
                }))
            })
            .sink_map_err(classify);
        let stream = stream.map(|item| match item {
            Ok(frame) => decode_tungstenite(frame),
            Err(e) => Some(Err(classify(e))),
        });
        Self::spawn(Box::pin(sink), Box::pin(stream), peer.into())
    }

    fn spawn(sink: FrameSink, stream: FrameStream, peer: String) -> Self {
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let cancel = CancellationToken::new();
        let id = ConnectionId::new();
        let _ = tokio::spawn(write_loop(sink, rx, cancel.clone(), id.clone()));
        Self {
            id,
            peer,
            outbound,
            inbound: Mutex::new(stream),
            closed: AtomicBool::new(false),
            cancel,
        }
    }
}

#[async_trait]
impl Connection for WsConnection {
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
        let text = message.to_json()?;
        let (ack, done) = oneshot::channel();
        let queued_and_written = async {
            self.outbound
                .send(Outbound { text, ack })
                .await
                .map_err(|_| TransportError::closed())?;
            done.await.map_err(|_| TransportError::closed())?
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(TransportError::closed()),
            result = queued_and_written => result,
        }
    }

    async fn receive(&self) -> Result<Message, TransportError> {
        let mut inbound = self.inbound.lock().await;
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(TransportError::closed()),
                next = inbound.next() => next,
            };
            match next {
                Some(Some(result)) => return result,
                Some(None) => trace!(conn_id = %self.id, "skipping control frame"),
                None => return Err(TransportError::closed()),
            }
        }
    }

    fn close(&self) -> Result<(), TransportError> {
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

/// Owns the sink. Stops on cancellation (including mid-write), on the
/// first failed write, or when the connection is dropped.
async fn write_loop(
    mut sink: FrameSink,
    mut rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
    id: ConnectionId,
) {
    loop {
        let outbound = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            outbound = rx.recv() => outbound,
        };
        let Some(Outbound { text, ack }) = outbound else {
            break;
        };
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::closed()),
            result = sink.send(Outgoing::Text(text)) => result,
        };
        let failed = result.is_err();
        let _ = ack.send(result);
        if failed {
            break;
        }
    }

    // A stalled peer never drains the socket; bound the Close frame.
    match tokio::time::timeout(CLOSE_FRAME_TIMEOUT, async {
        sink.send(Outgoing::Close).await?;
        sink.close().await
    })
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(conn_id = %id, error = %e, "close frame not delivered"),
        Err(_) => warn!(conn_id = %id, "peer not reading, close frame abandoned"),
    }
    debug!(conn_id = %id, "writer stopped");
}

fn decode_axum(frame: AxumMessage) -> Inbound {
    match frame {
        AxumMessage::Text(text) => Some(Message::from_json(text.as_str().as_bytes())),
        AxumMessage::Binary(data) => Some(Message::from_json(&data)),
        AxumMessage::Close(frame) => Some(Err(match frame {
            Some(cf) => TransportError::Closed {
                code: Some(cf.code),
                reason: cf.reason.as_str().to_owned(),
            },
            None => TransportError::closed(),
        })),
        AxumMessage::Ping(_) | AxumMessage::Pong(_) => None,
    }
}

fn decode_tungstenite(frame: WsMessage) -> Inbound {
    match frame {
        WsMessage::Text(text) => Some(Message::from_json(text.as_str().as_bytes())),
        WsMessage::Binary(data) => Some(Message::from_json(&data)),
        WsMessage::Close(frame) => Some(Err(match frame {
            Some(cf) => TransportError::Closed {
                code: Some(u16::from(cf.code)),
                reason: cf.reason.as_str().to_owned(),
            },
            None => TransportError::closed(),
        })),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => None,
    }
}

fn classify(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::closed(),
        WsError::Io(e) => TransportError::Io(e.to_string()),
        WsError::Protocol(e) => TransportError::Protocol(e.to_string()),
        other => TransportError::Protocol(other.to_string()),
    }
}
