//! Handler registry
//!
//! Event key → ordered list of callbacks. Mutated under the registry write lock,
//! snapshotted under the read lock by dispatch.

use crate::events::{Event, EventPayload, GatewayEventType, ANY_EVENT};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Registry key: one event type or the catch-all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    /// Every decoded event
    Any,
    /// One event type
    Event(GatewayEventType),
}

impl HandlerKey {
    /// Parse an event name, `"*"` being the catch-all
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        if name == ANY_EVENT {
            Some(Self::Any)
        } else {
            GatewayEventType::from_str(name).map(Self::Event)
        }
    }
}

impl std::fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str(ANY_EVENT),
            Self::Event(kind) => f.write_str(kind.as_str()),
        }
    }
}

pub(crate) type Callback<C> = Arc<dyn Fn(&C, &Event) + Send + Sync>;

pub(crate) struct HandlerEntry<C> {
    pub(crate) id: u64,
    pub(crate) key: HandlerKey,
    pub(crate) once: bool,
    fired: AtomicBool,
    pub(crate) callback: Callback<C>,
}

impl<C> HandlerEntry<C> {
    /// Claim a fire-once entry; persistent entries can always run
    pub(crate) fn claim(&self) -> bool {
        !self.once || !self.fired.swap(true, Ordering::AcqRel)
    }
}

pub(crate) struct RegistryInner<C> {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<HandlerKey, Vec<Arc<HandlerEntry<C>>>>>,
}

impl<C> RegistryInner<C> {
    fn remove(&self, key: HandlerKey, id: u64) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(&key) else {
            return false;
        };

        let before = list.len();
        list.retain(|entry| entry.id != id);
        let removed = list.len() != before;

        if list.is_empty() {
            handlers.remove(&key);
        }
        removed
    }
}

trait Unregister: Send + Sync {
    fn unregister(&self, key: HandlerKey, id: u64) -> bool;
}

impl<C: 'static> Unregister for RegistryInner<C> {
    fn unregister(&self, key: HandlerKey, id: u64) -> bool {
        self.remove(key, id)
    }
}

/// Removes exactly one registration
///
/// Dropping the token leaves the handler registered.
#[must_use = "dropping the token makes the handler impossible to unregister"]
pub struct HandlerToken {
    key: HandlerKey,
    id: u64,
    registry: Weak<dyn Unregister>,
}

impl HandlerToken {
    /// Registration id, unique within the registry
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Key the handler was registered under
    pub fn key(&self) -> HandlerKey {
        self.key
    }

    /// Remove the registration
    ///
    /// Returns `false` if it was already gone (a fire-once handler that fired, or a
    /// registry that no longer exists).
    pub fn unregister(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.unregister(self.key, self.id))
    }
}

impl std::fmt::Debug for HandlerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerToken")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

/// Registry of event handlers invoked with a context of type `C`
pub struct HandlerRegistry<C> {
    pub(crate) inner: Arc<RegistryInner<C>>,
}

impl<C: 'static> HandlerRegistry<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                handlers: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a callback under `key`
    pub fn register<F>(&self, key: HandlerKey, once: bool, callback: F) -> HandlerToken
    where
        F: Fn(&C, &Event) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(HandlerEntry {
            id,
            key,
            once,
            fired: AtomicBool::new(false),
            callback: Arc::new(callback),
        });

        self.inner
            .handlers
            .write()
            .entry(key)
            .or_default()
            .push(entry);

        tracing::trace!(key = %key, handler_id = id, once, "Handler registered");

        let registry: Arc<dyn Unregister> = self.inner.clone();
        HandlerToken {
            key,
            id,
            registry: Arc::downgrade(&registry),
        }
    }

    /// Register a callback for one payload type
    pub fn register_typed<E, F>(&self, once: bool, callback: F) -> HandlerToken
    where
        E: EventPayload,
        F: Fn(&C, &E) + Send + Sync + 'static,
    {
        self.register(HandlerKey::Event(E::KIND), once, move |ctx, event| {
            if let Some(payload) = E::extract(event) {
                callback(ctx, payload);
            }
        })
    }

    /// Number of handlers registered under `key`
    pub fn len(&self, key: HandlerKey) -> usize {
        self.inner.handlers.read().get(&key).map_or(0, Vec::len)
    }

    /// Whether no handler is registered at all
    pub fn is_empty(&self) -> bool {
        self.inner.handlers.read().is_empty()
    }

    /// Catch-all handlers followed by the handlers for `kind`, in registration order
    pub(crate) fn snapshot(&self, kind: GatewayEventType) -> Vec<Arc<HandlerEntry<C>>> {
        let handlers = self.inner.handlers.read();
        let any = handlers.get(&HandlerKey::Any).into_iter().flatten();
        let typed = handlers.get(&HandlerKey::Event(kind)).into_iter().flatten();
        any.chain(typed).cloned().collect()
    }

    pub(crate) fn remove(&self, key: HandlerKey, id: u64) -> bool {
        self.inner.remove(key, id)
    }
}

impl<C: 'static> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for HandlerRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
