//! Event subscriber trait.
//!
//! Each dispatch runs every matching subscriber on its own task:
//! - no ordering between subscribers, nor between successive events
//! - a panic is caught and logged, and affects only that invocation
//! - the producer never waits for `on_event` to finish

use std::sync::Arc;

use async_trait::async_trait;
use mesh_core::Event;
use tokio::sync::mpsc;

/// Receiver of lifecycle events.
///
/// Handle errors internally; a panic is isolated but still logged as a
/// subscriber failure.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Process one event. Called from a freshly spawned task.
    async fn on_event(&self, event: &Event);

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Forwards every event it receives into an unbounded channel.
///
/// Useful for embedding applications and tests that need to observe what
/// the node emitted. Events are dropped silently once the receiver is gone.
pub struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<Arc<Event>>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the receiving end of its channel.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<Event>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl Subscribe for ChannelSubscriber {
    async fn on_event(&self, event: &Event) {
        let _ = self.tx.send(Arc::new(event.clone()));
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
