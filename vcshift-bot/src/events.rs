//! Presence event source.
//!
//! The transfer core only ever sees presence transitions through
//! [`EventSource::subscribe`]; where they come from (gateway, replay, tests)
//! is the caller's business.

use std::sync::Arc;

use parking_lot::Mutex;
use vcshift_sdk::event::PresenceChange;

/// Callback for one presence transition. Must not block.
pub type PresenceHandler = Arc<dyn Fn(PresenceChange) + Send + Sync>;

pub trait EventSource: Send + Sync {
    /// Register a handler for every subsequent transition, in arrival order.
    fn subscribe(&self, handler: PresenceHandler);
}

/// In-process fan-out: whoever owns the transport calls [`PresenceFeed::publish`].
#[derive(Default)]
pub struct PresenceFeed {
    handlers: Mutex<Vec<PresenceHandler>>,
}

impl PresenceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `change` to every subscriber, synchronously and in subscription order.
    pub fn publish(&self, change: PresenceChange) {
        // Snapshot so a handler may subscribe without deadlocking.
        let handlers: Vec<PresenceHandler> = self.handlers.lock().clone();
        for handler in handlers {
            handler(change.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl EventSource for PresenceFeed {
    fn subscribe(&self, handler: PresenceHandler) {
        self.handlers.lock().push(handler);
    }
}
