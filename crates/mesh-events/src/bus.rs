//! Event bus: kind-keyed subscriber table with non-blocking dispatch.
//!
//! ```text
//!   dispatch(event)
//!       │   (read lock, clone subscriber list, release)
//!       ├──► spawn ─► sub1.on_event()   ─┐
//!       ├──► spawn ─► sub2.on_event()    ├─ panics caught + logged per task
//!       └──► spawn ─► subN.on_event()   ─┘
//! ```
//!
//! Guarantees: `dispatch` never waits for a subscriber, and a failing
//! subscriber never reaches the caller or other subscribers.
//!
//! Non-guarantees: no ordering across subscribers or across events, and no
//! completion signal. A `register` racing a `dispatch` for the same kind may
//! or may not be seen by that dispatch.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use mesh_core::{Event, EventKind};
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::handler::LogHandler;
use crate::subscriber::Subscribe;

/// Subscriber table plus dispatcher.
///
/// Constructed once at startup and shared by reference (`Arc<EventBus>`)
/// with every producer.
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<Arc<dyn Subscribe>>>>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a bus with [`LogHandler`] registered for every kind.
    pub fn with_default_handlers() -> Self {
        info!("initializing event bus");
        let bus = Self::new();
        bus.register_all(Arc::new(LogHandler));
        info!(kinds = EventKind::ALL.len(), "default event handlers registered");
        bus
    }

    /// Append `handler` to the subscriber list for `kind`.
    pub fn register(&self, kind: EventKind, handler: Arc<dyn Subscribe>) {
        debug!(event = %kind, subscriber = handler.name(), "registering subscriber");
        self.subscribers.write().entry(kind).or_default().push(handler);
    }

    /// Register `handler` for every event kind.
    pub fn register_all(&self, handler: Arc<dyn Subscribe>) {
        for kind in EventKind::ALL {
            self.register(kind, Arc::clone(&handler));
        }
    }

    /// Number of subscribers registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to its subscribers without waiting for them.
    ///
    /// A kind with no subscribers is a silent no-op. Must be called from
    /// within a tokio runtime; otherwise the event is logged and dropped.
    pub fn dispatch(&self, event: Event) {
        let kind = event.kind();
        let subscribers = {
            let table = self.subscribers.read();
            match table.get(&kind) {
                Some(subs) if !subs.is_empty() => subs.clone(),
                _ => {
                    trace!(event = %kind, "no subscribers");
                    return;
                }
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(event = %kind, "no async runtime, dropping event");
            return;
        };

        let event = Arc::new(event);
        for subscriber in subscribers {
            let event = Arc::clone(&event);
            let _ = runtime.spawn(async move {
                let outcome = AssertUnwindSafe(subscriber.on_event(&event))
                    .catch_unwind()
                    .await;
                if let Err(panic) = outcome {
                    warn!(
                        subscriber = subscriber.name(),
                        event = %event.kind(),
                        panic = %panic_message(panic.as_ref()),
                        "event subscriber panicked"
                    );
                }
            });
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
