//! Fan-out of inbound messages to every interested consumer.
//!
//! One connection, many consumers: presence widgets, form editors and
//! anything else that mounts after the connection exists subscribe here and
//! receive each decoded [`WireMessage`] in arrival order.
//!
//! Each dispatch works on a snapshot of the subscriber list taken before
//! the first handler runs, and the registry lock is never held while a
//! handler executes. Handlers may therefore subscribe or unsubscribe
//! (themselves or others) from inside a callback: the current round is
//! unaffected, the change applies from the next message on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::protocol::WireMessage;

/// Callback invoked with one decoded inbound message.
pub type Handler = Arc<dyn Fn(&WireMessage) + Send + Sync>;

/// Statistics for monitoring dispatch health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub messages_dispatched: u64,
    /// Sum over all messages of the handlers invoked
    pub deliveries: u64,
    pub active_subscribers: usize,
}

struct Entry {
    id: u64,
    handler: Handler,
    /// How many live `Subscription`s point at this entry
    registrations: usize,
}

struct RegistryInner {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
    messages_dispatched: AtomicU64,
    deliveries: AtomicU64,
}

impl RegistryInner {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, id: u64) -> bool {
        let mut entries = self.entries();
        let Some(index) = entries.iter().position(|e| e.id == id) else {
            return false;
        };
        entries[index].registrations -= 1;
        if entries[index].registrations == 0 {
            entries.remove(index);
        }
        true
    }
}

/// Subscriber set shared by the connection and its consumers.
///
/// Cloning is cheap and every clone refers to the same set.
#[derive(Clone)]
pub struct DispatchRegistry {
    inner: Arc<RegistryInner>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                messages_dispatched: AtomicU64::new(0),
                deliveries: AtomicU64::new(0),
            }),
        }
    }

    /// Register `handler`.
    ///
    /// Registering the same `Arc` again does not add a second delivery;
    /// the handler stays registered until every returned
    /// [`Subscription`] has been released.
    pub fn subscribe(&self, handler: Handler) -> Subscription {
        let mut entries = self.inner.entries();
        let existing = entries
            .iter_mut()
            .find(|e| same_handler(&e.handler, &handler));

        let id = match existing {
            Some(entry) => {
                entry.registrations += 1;
                entry.id
            }
            None => {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                entries.push(Entry {
                    id,
                    handler,
                    registrations: 1,
                });
                id
            }
        };

        Subscription {
            registry: Arc::downgrade(&self.inner),
            id,
            active: true,
        }
    }

    /// Register a closure.
    pub fn subscribe_fn<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&WireMessage) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(handler))
    }

    /// Deliver `message` to every handler registered right now.
    ///
    /// Returns the number of handlers invoked. Zero subscribers is fine.
    pub fn dispatch(&self, message: &WireMessage) -> usize {
        let snapshot: Vec<Handler> = self
            .inner
            .entries()
            .iter()
            .map(|e| Arc::clone(&e.handler))
            .collect();

        for handler in &snapshot {
            handler(message);
        }

        self.inner.messages_dispatched.fetch_add(1, Ordering::Relaxed);
        self.inner
            .deliveries
            .fetch_add(snapshot.len() as u64, Ordering::Relaxed);
        snapshot.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriber_count() == 0
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            messages_dispatched: self.inner.messages_dispatched.load(Ordering::Relaxed),
            deliveries: self.inner.deliveries.load(Ordering::Relaxed),
            active_subscribers: self.subscriber_count(),
        }
    }
}

impl Default for DispatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn same_handler(a: &Handler, b: &Handler) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Capability to remove one registration.
///
/// Dropping it unsubscribes. [`unsubscribe`](Self::unsubscribe) may be
/// called any number of times; only the first call has an effect.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Release this registration. Returns `true` the first time.
    pub fn unsubscribe(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        match self.registry.upgrade() {
            Some(inner) => inner.release(self.id),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
