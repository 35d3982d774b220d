//! Per-channel event dispatcher.
//!
//! Maps event names to ordered callback lists, plus a list of global
//! callbacks that receive every emitted event along with its name.
//!
//! # Re-entrancy
//!
//! All methods take `&self`. [`EventDispatcher::emit`] snapshots the matching
//! callbacks under the lock and releases it before invoking them, so a
//! callback may bind or unbind on the same dispatcher:
//!
//! - a callback removed during emission still runs in that emission
//! - a callback added during emission runs from the next emission on

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;

/// Handle returned by `bind`/`bind_global`, used to unbind.
pub type BindingId = u64;

/// Callback bound to a single event name.
pub type EventCallback = Arc<dyn Fn(&Value, &Metadata) + Send + Sync>;

/// Callback invoked for every emitted event.
pub type GlobalCallback = Arc<dyn Fn(&str, &Value, &Metadata) + Send + Sync>;

/// Extra information attached to an emitted event.
///
/// Bindings always receive a value; an event without metadata carries
/// `Metadata::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Member that originated a client event (presence channels).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Metadata {
    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
    }
}

#[derive(Default)]
struct Bindings {
    /// Event name -> callbacks in registration order.
    callbacks: HashMap<String, Vec<(BindingId, EventCallback)>>,
    global: Vec<(BindingId, GlobalCallback)>,
    next_id: BindingId,
}

impl Bindings {
    fn allocate_id(&mut self) -> BindingId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Event name registry with global callbacks.
#[derive(Default)]
pub struct EventDispatcher {
    bindings: Mutex<Bindings>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bindings = self.lock();
        f.debug_struct("EventDispatcher")
            .field("event_count", &bindings.callbacks.len())
            .field("global_count", &bindings.global.len())
            .field("next_id", &bindings.next_id)
            .finish()
    }
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Emission never holds the lock, so a poisoned mutex only means a
    // registration panicked mid-push; the map itself is still usable.
    fn lock(&self) -> MutexGuard<'_, Bindings> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` for the exact event name `event`.
    ///
    /// Registering the same closure twice keeps both; each fires.
    pub fn bind<F>(&self, event: &str, callback: F) -> BindingId
    where
        F: Fn(&Value, &Metadata) + Send + Sync + 'static,
    {
        let mut bindings = self.lock();
        let id = bindings.allocate_id();
        bindings
            .callbacks
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        log::debug!("Bound callback {} to '{}'", id, event);
        id
    }

    /// Register `callback` for every emitted event.
    pub fn bind_global<F>(&self, callback: F) -> BindingId
    where
        F: Fn(&str, &Value, &Metadata) + Send + Sync + 'static,
    {
        let mut bindings = self.lock();
        let id = bindings.allocate_id();
        bindings.global.push((id, Arc::new(callback)));
        log::debug!("Bound global callback {}", id);
        id
    }

    /// Remove the binding `id` from `event`.
    ///
    /// Returns `true` if a binding was removed. Unknown ids are a no-op.
    pub fn unbind(&self, event: &str, id: BindingId) -> bool {
        let mut bindings = self.lock();
        let Some(callbacks) = bindings.callbacks.get_mut(event) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(bound, _)| *bound != id);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            bindings.callbacks.remove(event);
        }
        removed
    }

    /// Remove every binding for `event`.
    pub fn unbind_event(&self, event: &str) {
        self.lock().callbacks.remove(event);
    }

    /// Remove the global binding `id`.
    pub fn unbind_global(&self, id: BindingId) -> bool {
        let mut bindings = self.lock();
        let before = bindings.global.len();
        bindings.global.retain(|(bound, _)| *bound != id);
        bindings.global.len() != before
    }

    /// Remove every global binding.
    pub fn unbind_all_global(&self) {
        self.lock().global.clear();
    }

    /// Remove every binding, named and global.
    pub fn unbind_all(&self) {
        let mut bindings = self.lock();
        bindings.callbacks.clear();
        bindings.global.clear();
    }

    /// Invoke the bindings for `event`, then every global binding.
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit(&self, event: &str, data: &Value, metadata: &Metadata) -> usize {
        let (named, global): (Vec<EventCallback>, Vec<GlobalCallback>) = {
            let bindings = self.lock();
            let named = bindings
                .callbacks
                .get(event)
                .map(|v| v.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default();
            let global = bindings.global.iter().map(|(_, cb)| Arc::clone(cb)).collect();
            (named, global)
        };

        let invoked = named.len() + global.len();
        if invoked == 0 {
            log::trace!("No callbacks bound for '{}'", event);
            return 0;
        }

        for cb in named {
            cb(data, metadata);
        }
        for cb in global {
            cb(event, data, metadata);
        }
        invoked
    }

    /// Check if any callback is bound to `event`.
    #[must_use]
    pub fn has_bindings(&self, event: &str) -> bool {
        self.lock()
            .callbacks
            .get(event)
            .is_some_and(|v| !v.is_empty())
    }

    /// Total number of bindings, named and global.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        let bindings = self.lock();
        bindings.callbacks.values().map(Vec::len).sum::<usize>() + bindings.global.len()
    }
}
