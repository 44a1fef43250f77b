use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use parley_types::events::{EventKind, ServerEvent};

pub type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// At most one handler per event kind.
///
/// Subscribing again replaces the previous handler instead of stacking a
/// second one, so re-entering a screen never double-handles an event.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<HashMap<EventKind, Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, Arc::new(handler));
    }

    /// Returns whether a handler was registered.
    pub fn unsubscribe(&self, kind: EventKind) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind)
            .is_some()
    }

    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&kind)
    }

    /// Run the handler for `event`'s kind, if any. The lock is released
    /// before the call so a handler may resubscribe.
    pub fn dispatch(&self, event: &ServerEvent) -> bool {
        let handler = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind())
            .cloned();

        match handler {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
