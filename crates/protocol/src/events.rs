//! Typed synchronous event emitter
//!
//! Listeners run inline on the emitting endpoint's thread, in subscription
//! order, before `emit` returns. Used to observe `synchronized` on the
//! client and the transport's send events.

/// Synchronous pub/sub for one event payload type.
pub struct EventEmitter<E> {
    listeners: Vec<Box<dyn FnMut(&E) + Send>>,
}

impl<E> EventEmitter<E> {
    /// Creates an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Subscribes a listener. Listeners cannot be removed; subscribe once
    /// at setup time.
    pub fn on(&mut self, listener: impl FnMut(&E) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Dispatches an event to every listener, in subscription order.
    pub fn emit(&mut self, event: &E) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }

    /// Number of subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
