//! Event bus implementation
//!
//! This module provides the [`Bus`] itself: subscription management on top of
//! the [`Registry`], the three delivery algorithms, and the lazily created
//! process-wide instance.

use crate::config::{BusConfig, FailurePolicy};
use crate::error::{BusError, BusResult};
use crate::registry::{Listener, ListenerHandle, Registry};
use crate::types::{DeliveryMode, EventDescriptor};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing::{debug, error, warn};
use uuid::Uuid;

static GLOBAL_BUS: OnceLock<Bus> = OnceLock::new();

/// Access the process-wide bus.
///
/// The bus is created on first access from [`BusConfig::from_env`]; every
/// later call returns the same instance. It is never torn down.
pub fn global() -> &'static Bus {
    GLOBAL_BUS.get_or_init(|| {
        let config = BusConfig::from_env();
        debug!(
            default_namespace = %config.default_namespace,
            failure_policy = ?config.failure_policy,
            strict_modes = config.strict_modes,
            "Initializing global event bus"
        );
        Bus::new(config)
    })
}

/// Alias for [`global`].
pub fn get_bus() -> &'static Bus {
    global()
}

/// Event bus statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Events accepted for dispatch
    pub events_released: u64,
    /// Release calls rejected before dispatch
    pub events_rejected: u64,
    /// Successful listener invocations
    pub deliveries: u64,
    /// Listener invocations that panicked
    pub listener_failures: u64,
    /// Currently bound listeners
    pub active_listeners: usize,
}

/// Outcome of a single release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// ID of the released event
    pub event_id: Uuid,
    /// Mode the event was routed with
    pub mode: DeliveryMode,
    /// Listeners that returned normally
    pub delivered: usize,
    /// Listeners that panicked
    pub failed: usize,
}

impl DispatchReport {
    fn empty(event: &EventDescriptor) -> Self {
        Self {
            event_id: event.id,
            mode: event.mode.normalized(),
            delivered: 0,
            failed: 0,
        }
    }

    /// Total listeners invoked.
    pub fn invoked(&self) -> usize {
        self.delivered + self.failed
    }
}

/// In-process publish/subscribe bus.
///
/// Listeners run synchronously on the releasing thread. The registry lock is
/// released before any listener runs, so listeners may subscribe, unsubscribe
/// or release from inside a callback; such changes apply from the next
/// release on.
pub struct Bus {
    /// Bus settings
    config: BusConfig,
    /// Registration table
    registry: RwLock<Registry>,
    /// Counters
    events_released: AtomicU64,
    events_rejected: AtomicU64,
    deliveries: AtomicU64,
    listener_failures: AtomicU64,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("config", &self.config)
            .field("active_listeners", &self.registry.read().listener_count())
            .finish()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl Bus {
    /// Create an independent bus.
    ///
    /// Most callers want [`global`]; separate instances are useful for
    /// tests and for embedding isolated buses.
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(Registry::new()),
            events_released: AtomicU64::new(0),
            events_rejected: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            listener_failures: AtomicU64::new(0),
        }
    }

    /// Bus settings.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Namespace used by [`Bus::event`].
    pub fn default_namespace(&self) -> &str {
        &self.config.default_namespace
    }

    /// Build a broadcast descriptor in the default namespace.
    pub fn event(&self, event_name: impl Into<String>, payload: Value) -> EventDescriptor {
        EventDescriptor::new(self.config.default_namespace.clone(), event_name, payload)
    }

    /// Subscribe a callback to `(namespace, event_name)`.
    ///
    /// The callback runs with an empty context. Keep the returned handle:
    /// it is the only way to unsubscribe.
    ///
    /// # Example
    ///
    /// ```rust
    /// use widget_bus::{Bus, EventDescriptor};
    /// use serde_json::json;
    ///
    /// let bus = Bus::default();
    /// let handle = bus.subscribe("192.168.100.1", "onClick", |data| {
    ///     println!("clicked: {data}");
    /// });
    ///
    /// bus.release(&EventDescriptor::new("192.168.100.1", "onClick", json!({"x": 1})))
    ///     .unwrap();
    /// assert!(bus.unsubscribe("192.168.100.1", "onClick", &handle));
    /// ```
    pub fn subscribe<F>(&self, namespace: &str, event_name: &str, callback: F) -> ListenerHandle
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.bind(namespace, event_name, Listener::new(callback))
    }

    /// Subscribe a callback that runs with `context` on every invocation.
    ///
    /// Subscribing the same callback and context twice yields two
    /// independent listeners with distinct handles.
    pub fn subscribe_with_context<C, F>(
        &self,
        namespace: &str,
        event_name: &str,
        context: C,
        callback: F,
    ) -> ListenerHandle
    where
        C: Send + Sync + 'static,
        F: Fn(&C, &Value) + Send + Sync + 'static,
    {
        self.bind(namespace, event_name, Listener::with_context(context, callback))
    }

    fn bind(&self, namespace: &str, event_name: &str, listener: Listener) -> ListenerHandle {
        let handle = self.registry.write().bind(namespace, event_name, listener);

        debug!(
            namespace = %namespace,
            event_name = %event_name,
            handle = %handle,
            "Listener subscribed"
        );

        handle
    }

    /// Remove the listener identified by `handle`.
    ///
    /// Returns `false` when the binding or the handle is unknown; nothing
    /// is changed in that case.
    pub fn unsubscribe(&self, namespace: &str, event_name: &str, handle: &ListenerHandle) -> bool {
        let removed = self.registry.write().unbind(namespace, event_name, handle);

        debug!(
            namespace = %namespace,
            event_name = %event_name,
            handle = %handle,
            removed,
            "Listener unsubscribe"
        );

        removed
    }

    /// Handles bound to `(namespace, event_name)`, most recent first.
    ///
    /// `None` when nothing is bound.
    pub fn handles(&self, namespace: &str, event_name: &str) -> Option<Vec<ListenerHandle>> {
        self.registry
            .read()
            .lookup(namespace, event_name)
            .map(|listeners| listeners.iter().map(Listener::handle).collect())
    }

    /// Namespaces holding at least one binding, in broadcast order.
    pub fn namespaces(&self) -> Vec<String> {
        self.registry.read().namespaces().map(str::to_string).collect()
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.registry.write().clear();
    }

    /// Release an event to its listeners.
    ///
    /// - `Broadcast`: every namespace, in registry order; all listeners of
    ///   each binding, most recent first.
    /// - `Unicast`: the most recently subscribed listener in the event's
    ///   namespace.
    /// - `Multicast`: all listeners in the event's namespace, most recent
    ///   first.
    /// - Unknown modes are ignored, or rejected in strict mode.
    ///
    /// A panicking listener is isolated or aborts the dispatch depending on
    /// [`FailurePolicy`].
    pub fn release(&self, event: &EventDescriptor) -> BusResult<DispatchReport> {
        let mode = event.mode.normalized();

        if let DeliveryMode::Other(code) = mode {
            if self.config.strict_modes {
                self.events_rejected.fetch_add(1, Ordering::Relaxed);
                warn!(event_id = %event.id, mode = code, "Rejected unknown delivery mode");
                return Err(BusError::UnknownDeliveryMode(code));
            }

            debug!(event_id = %event.id, mode = code, "Ignoring unknown delivery mode");
            return Ok(DispatchReport::empty(event));
        }

        let targets = self.resolve(mode, event);
        self.events_released.fetch_add(1, Ordering::Relaxed);

        debug!(
            event_id = %event.id,
            namespace = %event.namespace,
            event_name = %event.event_name,
            mode = %mode,
            targets = targets.len(),
            "Releasing event"
        );

        self.dispatch(event, &targets)
    }

    /// Release an event given as untyped JSON.
    ///
    /// Malformed input is rejected with [`BusError::InvalidEvent`] before
    /// any listener runs.
    pub fn release_value(&self, value: Value) -> BusResult<DispatchReport> {
        let event = EventDescriptor::from_value(value).map_err(|e| self.reject(e))?;
        self.release(&event)
    }

    /// Release an event given as a JSON string.
    pub fn release_json(&self, json: &str) -> BusResult<DispatchReport> {
        let value: Value = serde_json::from_str(json).map_err(|e| self.reject(e.into()))?;
        self.release_value(value)
    }

    fn reject(&self, err: BusError) -> BusError {
        self.events_rejected.fetch_add(1, Ordering::Relaxed);
        warn!(error = %err, "Rejected malformed event");
        err
    }

    /// Snapshot the listeners an event targets.
    fn resolve(&self, mode: DeliveryMode, event: &EventDescriptor) -> Vec<Listener> {
        let registry = self.registry.read();

        match mode {
            DeliveryMode::Broadcast => registry
                .namespaces()
                .filter_map(|ns| registry.lookup(ns, &event.event_name))
                .flat_map(|listeners| listeners.iter().cloned())
                .collect(),
            DeliveryMode::Unicast => registry
                .lookup(&event.namespace, &event.event_name)
                .and_then(|listeners| listeners.first().cloned())
                .into_iter()
                .collect(),
            DeliveryMode::Multicast => registry
                .lookup(&event.namespace, &event.event_name)
                .map(<[Listener]>::to_vec)
                .unwrap_or_default(),
            DeliveryMode::Other(_) => Vec::new(),
        }
    }

    fn dispatch(&self, event: &EventDescriptor, targets: &[Listener]) -> BusResult<DispatchReport> {
        let mut report = DispatchReport::empty(event);

        for listener in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.call(&event.payload))) {
                Ok(()) => {
                    report.delivered += 1;
                    self.deliveries.fetch_add(1, Ordering::Relaxed);
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    report.failed += 1;
                    self.listener_failures.fetch_add(1, Ordering::Relaxed);

                    error!(
                        event_id = %event.id,
                        event_name = %event.event_name,
                        handle = %listener.handle(),
                        "Listener panicked: {}",
                        message
                    );

                    if self.config.failure_policy == FailurePolicy::FailFast {
                        return Err(BusError::ListenerPanicked {
                            handle: listener.handle(),
                            message,
                        });
                    }
                }
            }
        }

        Ok(report)
    }

    /// Get bus stats.
    pub fn stats(&self) -> BusStats {
        BusStats {
            events_released: self.events_released.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
            active_listeners: self.registry.read().listener_count(),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
