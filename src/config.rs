//! Client configuration read from the environment.
//!
//! Endpoint resolution order: `UQL_ENDPOINT` > `VITE_UQL_ROOT` > localhost
//! default. `VITE_UQL_ROOT` is the variable the web frontend reads, so both
//! can share one `.env` file. Empty values are skipped.

use std::time::Duration;

/// Endpoint used when nothing is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/uql/";

/// Request timeout used when nothing is configured (10 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Root URL the dispatcher POSTs every call to.
    pub endpoint: String,
    /// Whole-request timeout. There is no retry on expiry.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a config from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|url| !url.trim().is_empty());
        let endpoint = non_empty("UQL_ENDPOINT")
            .or_else(|| non_empty("VITE_UQL_ROOT"))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let timeout = match lookup("UQL_TIMEOUT_SECS") {
            None => DEFAULT_TIMEOUT,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    log::warn!(
                        "Ignoring invalid UQL_TIMEOUT_SECS={:?}, using {}s",
                        raw,
                        DEFAULT_TIMEOUT.as_secs()
                    );
                    DEFAULT_TIMEOUT
                }
            },
        };

        Self { endpoint, timeout }
    }
}
