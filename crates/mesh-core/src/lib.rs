//! # mesh-core
//!
//! Foundation types shared by every crate of the mesh node:
//!
//! - **Message**: the single wire payload `{ "content": "..." }`
//! - **Events**: `EventKind`, `EventPayload`, and `Event`, with the
//!   kind-to-payload mapping fixed by constructors
//! - **Branded IDs**: `ConnectionId` as a newtype for type safety
//! - **Errors**: `TransportError` and `NodeError` via `thiserror`
//! - **Logging**: `tracing` subscriber bootstrap and in-memory log capture

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod message;

pub use errors::{NodeError, TransportError};
pub use events::{Event, EventKind, EventPayload};
pub use ids::ConnectionId;
pub use message::Message;
