//! Environment-driven bridge configuration.
//!
//! Everything is read through a lookup function so tests never touch the process
//! environment. Missing optional values fall back to defaults with a warning.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use itemrelay_events::BusBinding;

use crate::bridge::RetryPolicy;

pub const DEFAULT_BROKER_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_EXCHANGE: &str = "items";
pub const DEFAULT_QUEUE: &str = "item_events";
pub const DEFAULT_ROUTING_KEY: &str = "item";
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Which transport backs the bridge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BrokerKind {
    Redis,
    /// In-process broker; only useful when publisher and consumers share a process.
    Memory,
}

impl BrokerKind {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "redis" if cfg!(feature = "redis") => Ok(Self::Redis),
            "redis" => Err(ConfigError::invalid(
                "BROKER",
                "redis support was not compiled in (enable the `redis` feature)",
            )),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::invalid(
                "BROKER",
                format!("unknown broker '{other}' (expected redis or memory)"),
            )),
        }
    }

    fn default_kind() -> Self {
        if cfg!(feature = "redis") {
            Self::Redis
        } else {
            Self::Memory
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub broker: BrokerKind,
    pub broker_url: String,
    pub binding: BusBinding,
    pub reconnect_delay: Duration,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let broker = match non_empty(&lookup, "BROKER") {
            Some(raw) => BrokerKind::parse(&raw)?,
            None => BrokerKind::default_kind(),
        };

        let broker_url = or_default(&lookup, "BROKER_URL", DEFAULT_BROKER_URL);
        let exchange = or_default(&lookup, "EXCHANGE_NAME", DEFAULT_EXCHANGE);
        let queue = or_default(&lookup, "QUEUE_NAME", DEFAULT_QUEUE);
        let routing_key = or_default(&lookup, "ROUTING_KEY", DEFAULT_ROUTING_KEY);

        let reconnect_delay = match non_empty(&lookup, "RECONNECT_DELAY_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::invalid(
                        "RECONNECT_DELAY_SECS",
                        format!("expected a positive integer, got '{raw}'"),
                    ));
                }
            },
            None => Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
        };

        Ok(Self {
            broker,
            broker_url,
            binding: BusBinding::new(exchange, queue, routing_key),
            reconnect_delay,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.reconnect_delay)
    }
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`), falling back to
/// `default` when unset.
pub fn flag<F>(lookup: F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = non_empty(&lookup, key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, format!("expected a boolean, got '{raw}'"))),
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn or_default<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).unwrap_or_else(|| {
        warn!(key, default, "not set; using default");
        default.to_string()
    })
}
