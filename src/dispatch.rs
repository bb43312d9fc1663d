//! Event fan-out
//!
//! Handlers are grouped per [`EventCategory`] and invoked synchronously, in
//! decode order, from the decoder task. Every event is also published on a
//! broadcast channel for async consumers.

use std::sync::Arc;

use parking_lot::RwLock;
use streamdeck_transport::{DeckEvent, EventCategory, EventSink};
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcast channel capacity for decoded events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Callback invoked for each event of its category
pub type EventHandler = Arc<dyn Fn(&DeckEvent) + Send + Sync>;

/// Per-category handler table plus an event queue
pub struct Dispatcher {
    handlers: RwLock<[Vec<EventHandler>; EventCategory::ALL.len()]>,
    event_tx: broadcast::Sender<DeckEvent>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            handlers: RwLock::new(Default::default()),
            event_tx,
        }
    }

    /// Add a handler for one category; handlers run in registration order
    pub fn subscribe(&self, category: EventCategory, handler: EventHandler) {
        self.handlers.write()[category.index()].push(handler);
    }

    /// Receiver for every event decoded after this call
    pub fn subscribe_events(&self) -> broadcast::Receiver<DeckEvent> {
        self.event_tx.subscribe()
    }

    pub fn handler_count(&self, category: EventCategory) -> usize {
        self.handlers.read()[category.index()].len()
    }
}

impl EventSink for Dispatcher {
    fn dispatch(&self, event: DeckEvent) {
        // Snapshot so a handler may register further handlers
        let handlers = self.handlers.read()[event.category().index()].clone();
        trace!("Dispatching {:?} to {} handlers", event, handlers.len());
        for handler in &handlers {
            handler(&event);
        }
        // No receivers is not an error
        let _ = self.event_tx.send(event);
    }
}
