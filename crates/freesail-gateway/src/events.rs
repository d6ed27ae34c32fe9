//! Typed publish/subscribe for store and registry lifecycle events.
//!
//! Subscribers register a handler for one event kind and receive an explicit
//! [`Subscription`] handle. Handlers run synchronously on the emitting task,
//! after the bus lock has been released, so a handler may subscribe or
//! unsubscribe without deadlocking.

use freesail_core::protocol::ErrorCode;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

/// An event that can be routed by kind.
pub trait Event: Send + Sync + 'static {
    /// Discriminant used as the subscription key.
    type Kind: Copy + Eq + Hash + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E: Event> {
    next_id: u64,
    handlers: HashMap<E::Kind, Vec<(u64, Handler<E>)>>,
}

/// Event bus for one event type.
pub struct EventBus<E: Event> {
    inner: Arc<Mutex<Registry<E>>>,
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> EventBus<E> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: HashMap::new(),
            })),
        }
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: E::Kind, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.inner.lock();
            registry.next_id += 1;
            let id = registry.next_id;
            registry
                .handlers
                .entry(kind)
                .or_default()
                .push((id, Arc::new(handler)));
            id
        };

        let weak: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut registry = inner.lock();
                    if let Some(list) = registry.handlers.get_mut(&kind) {
                        list.retain(|(handler_id, _)| *handler_id != id);
                        if list.is_empty() {
                            registry.handlers.remove(&kind);
                        }
                    }
                }
            })),
        }
    }

    /// Deliver `event` to every handler subscribed to its kind.
    pub fn emit(&self, event: &E) {
        let handlers: Vec<Handler<E>> = {
            let registry = self.inner.lock();
            match registry.handlers.get(&event.kind()) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => return,
            }
        };
        for handler in handlers {
            handler(event);
        }
    }

    /// Number of handlers subscribed to `kind`.
    pub fn subscriber_count(&self, kind: E::Kind) -> usize {
        self.inner
            .lock()
            .handlers
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle keeps the handler registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the handler. Calling this more than once is a no-op.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Whether the handler is still registered through this handle.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Surface Store events.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Created { surface_id: String, catalog_id: String },
    Updated { surface_id: String },
    ComponentsReplaced { surface_id: String, count: usize },
    DataPatched { surface_id: String, path: String },
    Deleted { surface_id: String },
    Error { code: ErrorCode, surface_id: String, message: String },
}

/// Kinds of [`SurfaceEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceEventKind {
    Created,
    Updated,
    ComponentsReplaced,
    DataPatched,
    Deleted,
    Error,
}

impl Event for SurfaceEvent {
    type Kind = SurfaceEventKind;

    fn kind(&self) -> SurfaceEventKind {
        match self {
            Self::Created { .. } => SurfaceEventKind::Created,
            Self::Updated { .. } => SurfaceEventKind::Updated,
            Self::ComponentsReplaced { .. } => SurfaceEventKind::ComponentsReplaced,
            Self::DataPatched { .. } => SurfaceEventKind::DataPatched,
            Self::Deleted { .. } => SurfaceEventKind::Deleted,
            Self::Error { .. } => SurfaceEventKind::Error,
        }
    }
}

/// Session Registry events.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Created { session_id: String },
    Removed { session_id: String },
    CatalogsRegistered { session_id: String, catalog_ids: Vec<String> },
    Claimed { agent_id: String, session_id: String },
    Released { agent_id: String, session_id: String },
}

/// Kinds of [`SessionEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    Created,
    Removed,
    CatalogsRegistered,
    Claimed,
    Released,
}

impl Event for SessionEvent {
    type Kind = SessionEventKind;

    fn kind(&self) -> SessionEventKind {
        match self {
            Self::Created { .. } => SessionEventKind::Created,
            Self::Removed { .. } => SessionEventKind::Removed,
            Self::CatalogsRegistered { .. } => SessionEventKind::CatalogsRegistered,
            Self::Claimed { .. } => SessionEventKind::Claimed,
            Self::Released { .. } => SessionEventKind::Released,
        }
    }
}
