//! Listener registry keyed by event kind.
//!
//! Listeners are compared by identity (`Arc` pointer), so registering the
//! same `Arc` twice for one kind is rejected while two distinct closures with
//! identical code are both accepted.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{DanmakuError, Result};
use crate::message::DecodedMessage;

/// Result type for listener functions.
pub type HandlerResult = Result<()>;

/// Key listeners are registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Reply to our heartbeat.
    HeartbeatReply,
    /// Chat line.
    Danmaku,
    /// Gift.
    Gift,
    /// Room went live.
    Live,
    /// Room stopped broadcasting.
    Preparing,
    /// Passthrough command, by base `cmd` name.
    Command(String),
    /// JSON object without a `cmd`.
    Unknown,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeartbeatReply => f.write_str("heartbeat-reply"),
            Self::Danmaku => f.write_str("danmaku"),
            Self::Gift => f.write_str("gift"),
            Self::Live => f.write_str("live"),
            Self::Preparing => f.write_str("preparing"),
            Self::Command(cmd) => write!(f, "command:{}", cmd),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Trait for event listeners.
pub trait EventListener: Send + Sync + 'static {
    /// Handle one decoded message.
    fn on_event(&self, message: &DecodedMessage) -> HandlerResult;
}

impl<F> EventListener for F
where
    F: Fn(&DecodedMessage) -> HandlerResult + Send + Sync + 'static,
{
    fn on_event(&self, message: &DecodedMessage) -> HandlerResult {
        self(message)
    }
}

/// Shared listener handle; identity is the `Arc` allocation.
pub type Listener = Arc<dyn EventListener>;

/// Wrap a closure into a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&DecodedMessage) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Registry mapping event kinds to listeners.
///
/// Scoped to one session; safe to share behind an `Arc` between the
/// session owner and the receive loop.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<HashMap<EventKind, Vec<Listener>>>,
}

impl EventDispatcher {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind`.
    ///
    /// # Errors
    ///
    /// `DuplicateListener` if this exact listener is already registered for `kind`.
    pub fn add_listener(&self, kind: EventKind, listener: Listener) -> Result<()> {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = listeners.entry(kind.clone()).or_default();
        if entry.iter().any(|existing| Arc::ptr_eq(existing, &listener)) {
            return Err(DanmakuError::DuplicateListener(kind));
        }
        entry.push(listener);
        Ok(())
    }

    /// Unregister `listener` from `kind`.
    ///
    /// # Errors
    ///
    /// `UnknownListener` if it was not registered for `kind`.
    pub fn remove_listener(&self, kind: &EventKind, listener: &Listener) -> Result<()> {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = listeners
            .get_mut(kind)
            .ok_or_else(|| DanmakuError::UnknownListener(kind.clone()))?;
        let position = entry
            .iter()
            .position(|existing| Arc::ptr_eq(existing, listener))
            .ok_or_else(|| DanmakuError::UnknownListener(kind.clone()))?;
        entry.remove(position);
        if entry.is_empty() {
            listeners.remove(kind);
        }
        Ok(())
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: &EventKind) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .map_or(0, Vec::len)
    }

    /// Invoke every listener registered for `kind`.
    ///
    /// A listener that returns an error or panics is logged and does not stop
    /// the others. Returns the number of listeners that completed `Ok`.
    pub fn dispatch(&self, kind: &EventKind, message: &DecodedMessage) -> usize {
        // Snapshot so listeners may (un)register without deadlocking.
        let snapshot: Vec<Listener> = match self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
        {
            Some(listeners) => listeners.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(message))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => tracing::warn!(%kind, "Listener error: {}", e),
                Err(_) => tracing::error!(%kind, "Listener panicked"),
            }
        }
        delivered
    }

    /// Dispatch a message under its own kind.
    pub fn dispatch_message(&self, message: &DecodedMessage) -> usize {
        self.dispatch(&message.kind(), message)
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&EventKind, usize> =
            listeners.iter().map(|(kind, l)| (kind, l.len())).collect();
        f.debug_struct("EventDispatcher")
            .field("listeners", &counts)
            .finish()
    }
}
