//! Listener registry
//!
//! Maps `(namespace, event name)` pairs to ordered listener lists. The most
//! recently bound listener sits at the front of its list. Namespaces are
//! enumerated in the order they were first bound, which fixes the broadcast
//! order for a given sequence of subscriptions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque token identifying one subscription.
///
/// Returned by subscribe and required to unsubscribe. Two subscriptions of the
/// same callback get two different handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerHandle(Uuid);

impl ListenerHandle {
    /// Create a fresh handle.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ListenerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

type Callback = dyn Fn(&Value) + Send + Sync;

/// A callable bound to its invocation context.
///
/// Equality is handle identity; the callback itself is never compared.
#[derive(Clone)]
pub struct Listener {
    handle: ListenerHandle,
    callback: Arc<Callback>,
}

impl Listener {
    /// Wrap a callback that needs no context.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self::with_context((), move |_: &(), payload: &Value| callback(payload))
    }

    /// Wrap a callback so that every invocation sees `context`.
    pub fn with_context<C, F>(context: C, callback: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&C, &Value) + Send + Sync + 'static,
    {
        let context = Arc::new(context);
        Self {
            handle: ListenerHandle::new(),
            callback: Arc::new(move |payload: &Value| callback(&*context, payload)),
        }
    }

    /// The handle identifying this listener.
    pub fn handle(&self) -> ListenerHandle {
        self.handle
    }

    /// Invoke the listener with a payload.
    pub fn call(&self, payload: &Value) {
        (self.callback)(payload)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Registration table for all bindings.
#[derive(Debug, Default)]
pub struct Registry {
    /// Namespace -> event name -> listeners (front = most recent)
    bindings: HashMap<String, HashMap<String, Vec<Listener>>>,
    /// Namespaces in first-bind order
    order: Vec<String>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `listener` at the front of the `(namespace, event_name)` list,
    /// creating the list if needed.
    pub fn bind(&mut self, namespace: &str, event_name: &str, listener: Listener) -> ListenerHandle {
        let handle = listener.handle();

        if !self.bindings.contains_key(namespace) {
            self.order.push(namespace.to_string());
        }

        self.bindings
            .entry(namespace.to_string())
            .or_default()
            .entry(event_name.to_string())
            .or_default()
            .insert(0, listener);

        handle
    }

    /// Listeners bound to `(namespace, event_name)`, front to back.
    ///
    /// Returns `None` for unknown namespaces, unknown event names and empty
    /// lists alike.
    pub fn lookup(&self, namespace: &str, event_name: &str) -> Option<&[Listener]> {
        self.bindings
            .get(namespace)?
            .get(event_name)
            .map(Vec::as_slice)
            .filter(|listeners| !listeners.is_empty())
    }

    /// Remove the first listener carrying `handle`.
    ///
    /// Returns `false` when the binding does not exist or holds no such
    /// handle. Empty bindings and namespaces are dropped.
    pub fn unbind(&mut self, namespace: &str, event_name: &str, handle: &ListenerHandle) -> bool {
        let Some(events) = self.bindings.get_mut(namespace) else {
            return false;
        };
        let Some(listeners) = events.get_mut(event_name) else {
            return false;
        };
        let Some(pos) = listeners.iter().position(|l| l.handle() == *handle) else {
            return false;
        };

        listeners.remove(pos);

        if listeners.is_empty() {
            events.remove(event_name);
        }
        if events.is_empty() {
            self.bindings.remove(namespace);
            self.order.retain(|ns| ns != namespace);
        }

        true
    }

    /// Namespaces in first-bind order.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Total number of bound listeners across all bindings.
    pub fn listener_count(&self) -> usize {
        self.bindings
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Whether no listener is bound at all.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop every binding.
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.order.clear();
    }
}
