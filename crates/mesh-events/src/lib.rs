//! # mesh-events
//!
//! Asynchronous, fire-and-forget event notification.
//!
//! - [`EventBus`]: subscriber table keyed by [`EventKind`](mesh_core::EventKind);
//!   `dispatch` spawns one task per subscriber and returns immediately
//! - [`Subscribe`]: the subscriber extension point
//! - [`LogHandler`]: default subscriber rendering each event as a log line
//! - [`ChannelSubscriber`]: forwards events into an `mpsc` channel

#![deny(unsafe_code)]

pub mod bus;
pub mod handler;
pub mod subscriber;

pub use bus::EventBus;
pub use handler::LogHandler;
pub use subscriber::{ChannelSubscriber, Subscribe};
