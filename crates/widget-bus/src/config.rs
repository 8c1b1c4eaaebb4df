//! Bus configuration.
//!
//! Configuration is loaded from environment variables with defaults that
//! match the bus's historical behavior: listener failures are isolated and
//! unknown delivery modes are ignored.

use crate::error::{BusError, BusResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// Namespace used when the caller does not provide one.
pub const DEFAULT_NAMESPACE: &str = "BBUS_NAMESPACE";

/// What the dispatcher does when a listener panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the panic, count it and keep invoking the remaining listeners.
    #[default]
    Isolate,
    /// Stop the dispatch and return the failure to the releaser.
    FailFast,
}

impl FromStr for FailurePolicy {
    type Err = BusError;

    fn from_str(s: &str) -> BusResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolate" => Ok(FailurePolicy::Isolate),
            "fail_fast" | "fail-fast" | "failfast" => Ok(FailurePolicy::FailFast),
            other => Err(BusError::Config {
                key: "WIDGET_BUS_FAILURE_POLICY".to_string(),
                message: format!("expected `isolate` or `fail_fast`, got `{other}`"),
            }),
        }
    }
}

/// Runtime settings for a [`Bus`](crate::Bus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Namespace used by [`Bus::event`](crate::Bus::event).
    pub default_namespace: String,

    /// Listener panic handling.
    pub failure_policy: FailurePolicy,

    /// Reject unknown delivery modes instead of ignoring them.
    pub strict_modes: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            failure_policy: FailurePolicy::default(),
            strict_modes: false,
        }
    }
}

impl BusConfig {
    /// Load configuration from environment variables, falling back to the
    /// default for any value that is missing or unparsable.
    ///
    /// Environment variables:
    /// - `WIDGET_BUS_NAMESPACE`: default namespace (default: `BBUS_NAMESPACE`)
    /// - `WIDGET_BUS_FAILURE_POLICY`: `isolate` or `fail_fast` (default: `isolate`)
    /// - `WIDGET_BUS_STRICT_MODES`: reject unknown delivery modes (default: false)
    pub fn from_env() -> Self {
        let default = Self::default();

        let default_namespace = match std::env::var("WIDGET_BUS_NAMESPACE") {
            Ok(ns) if !ns.is_empty() => ns,
            Ok(_) => {
                warn!(key = "WIDGET_BUS_NAMESPACE", "Empty namespace, using default");
                default.default_namespace
            }
            Err(_) => default.default_namespace,
        };

        let failure_policy = match std::env::var("WIDGET_BUS_FAILURE_POLICY") {
            Ok(value) => value.parse().unwrap_or_else(|e: BusError| {
                warn!(
                    key = "WIDGET_BUS_FAILURE_POLICY",
                    value = %value,
                    error = %e,
                    "Invalid failure policy, using default"
                );
                default.failure_policy
            }),
            Err(_) => default.failure_policy,
        };

        let strict_modes = match std::env::var("WIDGET_BUS_STRICT_MODES") {
            Ok(value) => parse_flag(&value).unwrap_or_else(|| {
                warn!(
                    key = "WIDGET_BUS_STRICT_MODES",
                    value = %value,
                    "Invalid boolean, using default"
                );
                default.strict_modes
            }),
            Err(_) => default.strict_modes,
        };

        Self {
            default_namespace,
            failure_policy,
            strict_modes,
        }
    }

    /// Load configuration from environment variables, reporting invalid
    /// values instead of ignoring them.
    pub fn try_from_env() -> BusResult<Self> {
        let mut config = Self::default();

        if let Ok(ns) = std::env::var("WIDGET_BUS_NAMESPACE") {
            if ns.is_empty() {
                return Err(BusError::Config {
                    key: "WIDGET_BUS_NAMESPACE".to_string(),
                    message: "namespace must not be empty".to_string(),
                });
            }
            config.default_namespace = ns;
        }

        if let Ok(policy) = std::env::var("WIDGET_BUS_FAILURE_POLICY") {
            config.failure_policy = policy.parse()?;
        }

        if let Ok(flag) = std::env::var("WIDGET_BUS_STRICT_MODES") {
            config.strict_modes = parse_flag(&flag).ok_or_else(|| BusError::Config {
                key: "WIDGET_BUS_STRICT_MODES".to_string(),
                message: format!("expected a boolean, got `{flag}`"),
            })?;
        }

        Ok(config)
    }

    /// Set the default namespace.
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Enable or disable strict delivery mode checking.
    pub fn with_strict_modes(mut self, strict: bool) -> Self {
        self.strict_modes = strict;
        self
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
