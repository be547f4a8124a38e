//! Shared HTTP client construction.
//!
//! One `reqwest::Client` is built at startup and cloned into the forwarder,
//! the queue consumers and the health checker. Clones share the pool.

use std::time::Duration;

use reqwest::Client;

/// Immutable client settings injected at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Upper bound for any request made with the client
    pub request_timeout: Duration,
    /// TCP keep-alive interval for pooled connections
    pub tcp_keepalive: Duration,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            tcp_keepalive: Duration::from_secs(30),
            pool_max_idle_per_host: 100,
        }
    }
}

impl HttpSettings {
    /// Build a pooled client from these settings.
    pub fn build_client(&self) -> reqwest::Result<Client> {
        Client::builder()
            .timeout(self.request_timeout)
            .tcp_keepalive(self.tcp_keepalive)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .build()
    }
}
