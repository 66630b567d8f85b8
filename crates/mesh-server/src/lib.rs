//! # mesh-server
//!
//! The networked half of a mesh node.
//!
//! - [`Node`]: connection registry, per-connection read loops, broadcast
//!   fan-out, and lifecycle events on the [`EventBus`](mesh_events::EventBus)
//! - [`transport`]: the `Connection`/`Dialer` capability and its WebSocket
//!   implementation (axum on the accepting side, `tokio-tungstenite` on the
//!   dialing side)
//! - [`MeshServer`]: axum router with the peer endpoint and `/health`, and
//!   the shutdown order (listener, then connections)

#![deny(unsafe_code)]

pub mod health;
pub mod node;
pub mod registry;
pub mod server;
pub mod transport;

pub use node::{BroadcastReport, Node, NodeConfig};
pub use registry::ConnectionRegistry;
pub use server::{DEFAULT_SHUTDOWN_GRACE, MeshServer};
pub use transport::{Connection, Dialer, WsConnection, WsDialer};
