//! Configuration for the httpstan service client.

use std::time::Duration;

/// Environment variable consulted by [`ServiceConfig::from_env`].
pub const SERVICE_URL_ENV: &str = "HTTPSTAN_URL";

/// Configuration for connecting to an httpstan service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL including the API version prefix (e.g., "http://127.0.0.1:8080/v1")
    pub base_url: String,

    /// Timeout for a single HTTP exchange.
    ///
    /// Compilation requests can take minutes, so this is generous. It does not
    /// bound the sampling poll loop, which runs until every chain reports done.
    pub timeout: Duration,

    /// Pause between full polling sweeps over unfinished chains.
    pub poll_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/v1".to_string(),
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl ServiceConfig {
    /// Create a configuration pointing at the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().base_url(base_url)
    }

    /// Build a configuration from `HTTPSTAN_URL`, falling back to the default address.
    pub fn from_env() -> Self {
        match std::env::var(SERVICE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::new(url),
            _ => Self::default(),
        }
    }

    /// Set the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the pause between polling sweeps.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
