//! Typed fan-out signals fired by the processor.
//!
//! Handlers run synchronously on the firing worker thread; a slow handler
//! stalls that worker and nothing else. Within a single pipeline run the
//! processed signal always fires before the broadcast signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::Message;

use crate::domain::work_unit::Broadcast;
use crate::ports::outbound::{Peer, Request};

/// Identifies a handler registered on a [`Signal`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A thread-safe, strongly-typed fan-out signal.
pub struct Signal<T> {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a handler; returns the id to unsubscribe with.
    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Invokes every handler with `event`, on the calling thread.
    ///
    /// The registry lock is not held during invocation, so handlers may
    /// subscribe or unsubscribe reentrantly.
    pub fn fire(&self, event: &T) {
        let handlers: Vec<Handler<T>> = self
            .handlers
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload of the message-processed signal.
#[derive(Clone)]
pub struct MessageProcessed {
    /// The parsed message.
    pub message: Arc<Message>,
    /// The outstanding request this arrival satisfied, if any.
    pub request: Option<Request>,
    /// The delivering peer; `None` for locally originated messages.
    pub peer: Option<Arc<dyn Peer>>,
}

/// The signals fired by the processor.
#[derive(Default)]
pub struct ProcessorEvents {
    /// Fired when a transaction payload was fully processed.
    pub message_processed: Signal<MessageProcessed>,
    /// Fired when a payload should be gossiped onwards.
    pub broadcast_message: Signal<Broadcast>,
}
