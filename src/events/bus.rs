//! Topic-namespaced event bus
//!
//! Two channels share one bus: the local channel is scoped to the annotation
//! subsystem, the global channel reaches the wider application. Handlers run
//! synchronously in registration order. The handler list is snapshotted
//! before dispatch, so a handler may emit, subscribe or unsubscribe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Capacity of the broadcast tap returned by [`EventBus::subscribe`]
const TAP_CAPACITY: usize = 256;

/// Event namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Local,
    Global,
}

/// A dispatched event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub name: String,
    pub channel: Channel,
    pub payload: Value,
}

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Returned by `on`/`on_global`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    channel: Channel,
    name: String,
    handler: Handler,
}

/// Shared event bus handle
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
    tap: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tap, _) = broadcast::channel(TAP_CAPACITY);
        Self {
            inner: Arc::new(BusInner {
                registrations: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                tap,
            }),
        }
    }

    /// Subscribe to a local event
    pub fn on<F>(&self, name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(Channel::Local, name, Arc::new(handler))
    }

    /// Subscribe to a global event
    pub fn on_global<F>(&self, name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(Channel::Global, name, Arc::new(handler))
    }

    fn register(&self, channel: Channel, name: &str, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.registrations.write().push(Registration {
            id,
            channel,
            name: name.to_string(),
            handler,
        });
        id
    }

    /// Remove a subscription; `false` if it was not registered
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut registrations = self.inner.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    pub fn emit(&self, name: &str, payload: Value) {
        self.dispatch(Channel::Local, name, payload);
    }

    pub fn emit_global(&self, name: &str, payload: Value) {
        self.dispatch(Channel::Global, name, payload);
    }

    /// Emit the same event on both channels
    pub fn emit_both(&self, name: &str, payload: Value) {
        self.dispatch(Channel::Local, name, payload.clone());
        self.dispatch(Channel::Global, name, payload);
    }

    fn dispatch(&self, channel: Channel, name: &str, payload: Value) {
        let handlers: Vec<Handler> = self
            .inner
            .registrations
            .read()
            .iter()
            .filter(|r| r.channel == channel && r.name == name)
            .map(|r| r.handler.clone())
            .collect();

        let event = Event {
            name: name.to_string(),
            channel,
            payload,
        };

        tracing::trace!("{:?} event {} ({} handlers)", channel, name, handlers.len());

        for handler in handlers {
            handler(&event);
        }

        // No receivers is not an error
        let _ = self.inner.tap.send(event);
    }

    /// Observe every event on both channels
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.tap.subscribe()
    }

    /// Number of handlers registered for a name on a channel
    pub fn handler_count(&self, channel: Channel, name: &str) -> usize {
        self.inner
            .registrations
            .read()
            .iter()
            .filter(|r| r.channel == channel && r.name == name)
            .count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("registrations", &self.inner.registrations.read().len())
            .finish()
    }
}
