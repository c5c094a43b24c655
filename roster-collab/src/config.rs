//! Client configuration: endpoint, reconnect policy and keep-alive.
//!
//! Values come from [`ClientConfig::default`] and may be overlaid from the
//! environment with [`ClientConfig::from_env`]:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `ROSTER_WS_URL` | `url` | `ws://127.0.0.1:8080` |
//! | `ROSTER_RECONNECT_BASE_MS` | `reconnect.base_delay` | 1000 |
//! | `ROSTER_RECONNECT_MAX_MS` | `reconnect.max_delay` | 30000 |
//! | `ROSTER_RECONNECT_ATTEMPTS` | `reconnect.max_attempts` | 5 |
//! | `ROSTER_KEEPALIVE_MS` | `keepalive_interval` | 30000 |

use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const ENV_URL: &str = "ROSTER_WS_URL";
pub const ENV_RECONNECT_BASE_MS: &str = "ROSTER_RECONNECT_BASE_MS";
pub const ENV_RECONNECT_MAX_MS: &str = "ROSTER_RECONNECT_MAX_MS";
pub const ENV_RECONNECT_ATTEMPTS: &str = "ROSTER_RECONNECT_ATTEMPTS";
pub const ENV_KEEPALIVE_MS: &str = "ROSTER_KEEPALIVE_MS";

/// Bounded exponential backoff.
///
/// `delay(n) = min(base_delay * 2^n, max_delay)`; automatic retries stop
/// once `max_attempts` of them have failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Collaboration endpoint (`ws://` or `wss://`)
    pub url: String,
    pub reconnect: ReconnectPolicy,
    /// Interval between keep-alive pings while open
    pub keepalive_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".to_string(),
            reconnect: ReconnectPolicy::default(),
            keepalive_interval: Duration::from_millis(30_000),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `url`.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with the `ROSTER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_URL) {
            config.url = url;
        }
        if let Some(ms) = read_millis(&lookup, ENV_RECONNECT_BASE_MS)? {
            config.reconnect.base_delay = ms;
        }
        if let Some(ms) = read_millis(&lookup, ENV_RECONNECT_MAX_MS)? {
            config.reconnect.max_delay = ms;
        }
        if let Some(raw) = lookup(ENV_RECONNECT_ATTEMPTS) {
            config.reconnect.max_attempts = raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                key: ENV_RECONNECT_ATTEMPTS,
                value: raw.clone(),
            })?;
        }
        if let Some(ms) = read_millis(&lookup, ENV_KEEPALIVE_MS)? {
            config.keepalive_interval = ms;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the connection manager cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.url)?;
        if self.keepalive_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("keepalive_interval"));
        }
        Ok(())
    }
}

/// Only `ws://` and `wss://` endpoints with a host are accepted.
pub fn validate_url(url: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.to_owned()))?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(ConfigError::InvalidUrl(url.to_owned()));
    }
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ConfigError::InvalidUrl(url.to_owned())),
    }
}

fn read_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::InvalidNumber {
                key,
                value: raw.clone(),
            }),
        None => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid collaboration url: {0:?} (expected ws:// or wss://)")]
    InvalidUrl(String),
    #[error("{key} must be an unsigned integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(16_000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(30_000));
    }

    #[test]
    fn test_backoff_huge_attempt_saturates() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(40), policy.max_delay);
        assert_eq!(policy.delay_for(u32::MAX), policy.max_delay);
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENV_URL, "wss://collab.example.com/ws"),
            (ENV_RECONNECT_BASE_MS, "250"),
            (ENV_RECONNECT_MAX_MS, "4000"),
            (ENV_RECONNECT_ATTEMPTS, "3"),
            (ENV_KEEPALIVE_MS, "10000"),
        ]))
        .unwrap();

        assert_eq!(config.url, "wss://collab.example.com/ws");
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_delay, Duration::from_millis(4000));
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.keepalive_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_from_lookup_bad_number() {
        let err = ClientConfig::from_lookup(lookup_from(&[(ENV_RECONNECT_ATTEMPTS, "many")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                key: ENV_RECONNECT_ATTEMPTS,
                value: "many".into()
            }
        );
    }

    #[test]
    fn test_invalid_urls() {
        assert!(validate_url("ws://localhost:8080").is_ok());
        assert!(validate_url("wss://example.com/ws").is_ok());
        assert!(validate_url("http://localhost").is_err());
        assert!(validate_url("ws://").is_err());
        assert!(validate_url("localhost:8080").is_err());
    }

    #[test]
    fn test_malformed_hosts_and_ports_rejected() {
        for url in ["ws://not a host", "ws://[::", "ws://:::::", "ws://host:99999999"] {
            assert_eq!(
                validate_url(url),
                Err(ConfigError::InvalidUrl(url.to_string())),
                "{url} should be rejected"
            );
        }
        assert!(validate_url("ws://[::1]:8080/ws").is_ok());
    }

    #[test]
    fn test_from_lookup_rejects_bad_url() {
        let err = ClientConfig::from_lookup(lookup_from(&[(ENV_URL, "ws://host:99999999")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidUrl("ws://host:99999999".into()));
    }

    #[test]
    fn test_zero_keepalive_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[(ENV_KEEPALIVE_MS, "0")])).unwrap_err();
        assert_eq!(err, ConfigError::ZeroInterval("keepalive_interval"));
    }
}
