//! # Widget Bus
//!
//! This crate provides an in-process publish/subscribe bus. Components
//! subscribe to named events under a namespace; producers release events that
//! the bus routes to the matching listeners, synchronously, on the caller's
//! thread.
//!
//! ## Overview
//!
//! The widget-bus crate handles:
//! - **Registry**: `(namespace, event name)` bindings, most recent listener first
//! - **Dispatch**: broadcast, unicast and multicast delivery
//! - **Global Bus**: a lazily created process-wide instance
//! - **Validation**: schema checks for events arriving as untyped JSON
//!
//! ## Delivery Modes
//!
//! | Mode        | Code | Targets                                                      |
//! |-------------|------|--------------------------------------------------------------|
//! | `Broadcast` | 0    | every namespace with a binding for the event name            |
//! | `Unicast`   | 1    | the most recently subscribed listener in the event namespace |
//! | `Multicast` | 2    | all listeners in the event namespace, most recent first      |
//!
//! Any other code is ignored, unless [`BusConfig::strict_modes`] is set.
//!
//! ## Usage
//!
//! ### Subscribing
//!
//! ```rust
//! use widget_bus::global;
//!
//! let bus = global();
//! let handle = bus.subscribe("192.168.100.1", "onClick", |data| {
//!     println!("clicked: {data}");
//! });
//!
//! // Keep the handle; it is the only way to unsubscribe.
//! bus.unsubscribe("192.168.100.1", "onClick", &handle);
//! ```
//!
//! ### Releasing Events
//!
//! ```rust
//! use widget_bus::{Bus, DeliveryMode, EventDescriptor};
//! use serde_json::json;
//!
//! let bus = Bus::default();
//! bus.subscribe("panel", "resize", |size| println!("old listener: {size}"));
//! bus.subscribe("panel", "resize", |size| println!("new listener: {size}"));
//!
//! // Only the newest listener sees a unicast event.
//! let event = EventDescriptor::new("panel", "resize", json!({"w": 640}))
//!     .with_mode(DeliveryMode::Unicast);
//! let report = bus.release(&event).unwrap();
//! assert_eq!(report.delivered, 1);
//! ```
//!
//! ## Listener Failures
//!
//! A listener fails by panicking. With [`FailurePolicy::Isolate`] (default)
//! the panic is logged and the remaining listeners still run; with
//! [`FailurePolicy::FailFast`] the dispatch stops and the releaser receives
//! [`BusError::ListenerPanicked`].

pub mod bus;
pub mod config;
pub mod error;
pub mod registry;
pub mod types;

// Re-export main types
pub use bus::{get_bus, global, Bus, BusStats, DispatchReport};
pub use config::{BusConfig, FailurePolicy, DEFAULT_NAMESPACE};
pub use error::{BusError, BusResult};
pub use registry::{Listener, ListenerHandle, Registry};
pub use types::{DeliveryMode, EventDescriptor};
