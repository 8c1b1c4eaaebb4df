//! Event descriptor types
//!
//! An [`EventDescriptor`] names its target binding, carries a JSON payload and
//! selects one of the delivery modes. Descriptors are immutable once built.

use crate::error::{BusError, BusResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Routing scheme for an event.
///
/// Serialized as its integer code. Codes outside `0..=2` are kept as
/// [`DeliveryMode::Other`] and are ignored by the dispatcher unless the bus
/// runs in strict mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum DeliveryMode {
    /// Every namespace holding a binding for the event name
    #[default]
    Broadcast,
    /// Most recently subscribed listener in one namespace
    Unicast,
    /// All listeners in one namespace
    Multicast,
    /// Unrecognized code
    Other(u8),
}

impl DeliveryMode {
    /// Integer code of this mode.
    pub fn code(self) -> u8 {
        match self {
            DeliveryMode::Broadcast => 0,
            DeliveryMode::Unicast => 1,
            DeliveryMode::Multicast => 2,
            DeliveryMode::Other(code) => code,
        }
    }

    /// Collapse `Other` values that carry a known code onto that mode.
    pub fn normalized(self) -> Self {
        Self::from(self.code())
    }

    /// Whether the dispatcher knows how to route this mode.
    pub fn is_known(self) -> bool {
        !matches!(self.normalized(), DeliveryMode::Other(_))
    }

    /// Lowercase name, or `"other"`.
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMode::Broadcast => "broadcast",
            DeliveryMode::Unicast => "unicast",
            DeliveryMode::Multicast => "multicast",
            DeliveryMode::Other(_) => "other",
        }
    }
}

impl From<u8> for DeliveryMode {
    fn from(code: u8) -> Self {
        match code {
            0 => DeliveryMode::Broadcast,
            1 => DeliveryMode::Unicast,
            2 => DeliveryMode::Multicast,
            other => DeliveryMode::Other(other),
        }
    }
}

impl From<DeliveryMode> for u8 {
    fn from(mode: DeliveryMode) -> Self {
        mode.code()
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Other(code) => write!(f, "other({code})"),
            mode => f.write_str(mode.as_str()),
        }
    }
}

/// Event released onto the bus.
///
/// Deserialization goes through [`EventDescriptor::from_value`], so `id`,
/// `timestamp` and `mode` may be omitted from the input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct EventDescriptor {
    /// Unique event ID
    pub id: Uuid,

    /// Target namespace (ignored for broadcast routing)
    pub namespace: String,

    /// Event name
    pub event_name: String,

    /// Event payload
    pub payload: Value,

    /// Delivery mode
    pub mode: DeliveryMode,

    /// Timestamp when the descriptor was created
    pub timestamp: DateTime<Utc>,
}

impl EventDescriptor {
    /// Create a broadcast event.
    ///
    /// # Arguments
    ///
    /// * `namespace` - Target namespace
    /// * `event_name` - Event name
    /// * `payload` - Event payload
    pub fn new(namespace: impl Into<String>, event_name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            namespace: namespace.into(),
            event_name: event_name.into(),
            payload,
            mode: DeliveryMode::Broadcast,
            timestamp: Utc::now(),
        }
    }

    /// Set the delivery mode.
    ///
    /// `Other` values carrying a known code are stored as that mode.
    pub fn with_mode(mut self, mode: impl Into<DeliveryMode>) -> Self {
        self.mode = mode.into().normalized();
        self
    }

    /// Shorthand for a broadcast event.
    pub fn broadcast(namespace: impl Into<String>, event_name: impl Into<String>, payload: Value) -> Self {
        Self::new(namespace, event_name, payload)
    }

    /// Shorthand for a unicast event.
    pub fn unicast(namespace: impl Into<String>, event_name: impl Into<String>, payload: Value) -> Self {
        Self::new(namespace, event_name, payload).with_mode(DeliveryMode::Unicast)
    }

    /// Shorthand for a multicast event.
    pub fn multicast(namespace: impl Into<String>, event_name: impl Into<String>, payload: Value) -> Self {
        Self::new(namespace, event_name, payload).with_mode(DeliveryMode::Multicast)
    }

    /// Build a descriptor from untyped JSON.
    ///
    /// Requires a string `namespace`, a string `event_name` and a `payload`
    /// (which may be `null`). `mode` is optional and must be an integer in
    /// `0..=255` when present. `id` and `timestamp` are generated when absent.
    pub fn from_value(value: Value) -> BusResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(BusError::InvalidEvent("event must be a JSON object".into()));
        };

        let namespace = match fields.remove("namespace") {
            Some(Value::String(ns)) => ns,
            Some(_) => return Err(BusError::InvalidEvent("`namespace` must be a string".into())),
            None => return Err(BusError::InvalidEvent("missing `namespace`".into())),
        };

        let event_name = match fields.remove("event_name") {
            Some(Value::String(name)) => name,
            Some(_) => return Err(BusError::InvalidEvent("`event_name` must be a string".into())),
            None => return Err(BusError::InvalidEvent("missing `event_name`".into())),
        };

        let payload = fields
            .remove("payload")
            .ok_or_else(|| BusError::InvalidEvent("missing `payload`".into()))?;

        let mode = match fields.remove("mode") {
            None | Some(Value::Null) => DeliveryMode::Broadcast,
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|code| u8::try_from(code).ok())
                .map(DeliveryMode::from)
                .ok_or_else(|| BusError::InvalidEvent(format!("`mode` out of range: {n}")))?,
            Some(_) => return Err(BusError::InvalidEvent("`mode` must be an integer".into())),
        };

        let mut event = Self::new(namespace, event_name, payload).with_mode(mode);

        if let Some(id) = fields.remove("id") {
            event.id = serde_json::from_value(id)
                .map_err(|e| BusError::InvalidEvent(format!("invalid `id`: {e}")))?;
        }
        if let Some(timestamp) = fields.remove("timestamp") {
            event.timestamp = serde_json::from_value(timestamp)
                .map_err(|e| BusError::InvalidEvent(format!("invalid `timestamp`: {e}")))?;
        }

        Ok(event)
    }

    /// Parse the payload into a specific type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

impl TryFrom<Value> for EventDescriptor {
    type Error = BusError;

    fn try_from(value: Value) -> BusResult<Self> {
        Self::from_value(value)
    }
}
