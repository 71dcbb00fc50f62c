//! Event fan-out: named events delivered to every subscribed callback.
//!
//! Subscriptions are tagged with a [`ReceiverId`] so an owner can drop its
//! callbacks by identity rather than by comparing closures.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use spacemux_protocol::Value;

/// A subscriber callback. Receives the event's arguments.
pub type Callback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Identifies the owner of a group of subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(u64);

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receiver-{}", self.0)
    }
}

struct Subscription {
    receiver: ReceiverId,
    callback: Callback,
}

/// Registry of event subscriptions.
///
/// Callbacks run synchronously on the dispatching task, in registration
/// order. The registry lock is released before any callback runs, so a
/// callback may subscribe, unsubscribe, or dispatch again; such changes
/// take effect from the next dispatch.
#[derive(Default)]
pub struct Dispatcher {
    next_receiver: AtomicU64,
    subscriptions: Mutex<HashMap<String, Vec<Subscription>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh receiver identity.
    pub fn receiver(&self) -> ReceiverId {
        ReceiverId(self.next_receiver.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Subscribes `callback` to `event` on behalf of `receiver`.
    ///
    /// The same receiver may subscribe to the same event more than once;
    /// each registration is called.
    pub fn subscribe<F>(&self, event: &str, receiver: ReceiverId, callback: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.subscriptions
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(Subscription {
                receiver,
                callback: Arc::new(callback),
            });
    }

    /// Removes every subscription `receiver` holds for `event`, however
    /// many times it subscribed. Returns how many were removed.
    pub fn unsubscribe(&self, event: &str, receiver: ReceiverId) -> usize {
        let mut subscriptions = self.subscriptions.lock();
        let Some(subs) = subscriptions.get_mut(event) else {
            return 0;
        };
        let before = subs.len();
        subs.retain(|s| s.receiver != receiver);
        let removed = before - subs.len();
        if subs.is_empty() {
            subscriptions.remove(event);
        }
        removed
    }

    /// Removes every subscription held by `receiver`, across all events.
    pub fn unsubscribe_all(&self, receiver: ReceiverId) -> usize {
        let mut subscriptions = self.subscriptions.lock();
        let mut removed = 0;
        subscriptions.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|s| s.receiver != receiver);
            removed += before - subs.len();
            !subs.is_empty()
        });
        removed
    }

    /// Invokes every callback subscribed to `event` with `args`.
    ///
    /// Returns how many callbacks ran. An event nobody listens to is a
    /// no-op.
    pub fn dispatch(&self, event: &str, args: &[Value]) -> usize {
        let callbacks: Vec<Callback> = match self.subscriptions.lock().get(event) {
            Some(subs) => subs.iter().map(|s| Arc::clone(&s.callback)).collect(),
            None => return 0,
        };
        tracing::trace!(event, listeners = callbacks.len(), "dispatching event");
        for callback in &callbacks {
            callback(args);
        }
        callbacks.len()
    }

    /// Drops every subscription. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.subscriptions.lock());
        removed.values().map(Vec::len).sum()
    }

    /// Number of callbacks currently subscribed to `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscriptions.lock().get(event).map_or(0, Vec::len)
    }
}
