//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables, falling back to
//! defaults suitable for a local proxy and notifier.

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::consumer::ConsumerSettings;
use crate::forward::DownstreamTarget;
use crate::health::QueueProbeSettings;
use crate::http::HttpSettings;
use crate::queue::ProxySettings;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Queue proxy
    // =========================================================================
    /// Kafka REST proxy base addresses
    pub queue_addrs: Vec<String>,

    /// Consumer group name
    pub queue_group: String,

    /// Topic to consume
    pub queue_topic: String,

    /// `auto.offset.reset` for new consumer instances
    pub queue_offset: String,

    /// Let the proxy commit offsets on fetch
    pub queue_auto_commit: bool,

    /// Authorization header value for the proxy
    pub queue_authorization: Option<String>,

    /// Host header override for the proxy
    pub queue_host: Option<String>,

    /// Pause after a failed or empty fetch
    pub queue_backoff_ms: u64,

    // =========================================================================
    // Downstream notifier
    // =========================================================================
    /// Physical address of the notifier (usually a load balancer)
    pub downstream_addr: String,

    /// Logical host name of the notifier
    pub downstream_host: String,

    /// Path messages are posted to
    pub downstream_endpoint: String,

    /// Authorization header value for the notifier
    pub downstream_authorization: Option<String>,

    // =========================================================================
    // Consumption
    // =========================================================================
    /// Number of independent consume loops
    pub num_consumers: usize,

    /// Optional cap on concurrent forwards per consume loop
    pub max_in_flight: Option<usize>,

    /// Delay between starting consume loops
    pub consumer_start_delay_ms: u64,

    /// Grace window for in-flight forwards at shutdown
    pub shutdown_grace_ms: u64,

    // =========================================================================
    // HTTP
    // =========================================================================
    /// Timeout for forwards and proxy calls
    pub request_timeout_ms: u64,

    /// Timeout for each health probe
    pub health_timeout_ms: u64,

    /// Idle pooled connections per host
    pub pool_max_idle_per_host: usize,

    /// TCP keep-alive for pooled connections
    pub tcp_keepalive_secs: u64,

    /// Port for the health endpoints
    pub port: u16,
}

/// Configuration that cannot be used to start the bridge.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is not a valid URL: {value}")]
    InvalidUrl { name: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            queue_addrs: parse_csv("QUEUE_PROXY_ADDRS")
                .unwrap_or_else(|| vec!["http://localhost:8082".to_string()]),

            queue_group: env::var("QUEUE_GROUP").unwrap_or_else(|_| "kafka-bridge".to_string()),

            queue_topic: env::var("QUEUE_TOPIC")
                .unwrap_or_else(|_| "NativeCmsPublicationEvents".to_string()),

            queue_offset: env::var("QUEUE_OFFSET").unwrap_or_else(|_| "largest".to_string()),

            queue_auto_commit: parse_bool("QUEUE_AUTO_COMMIT", true),

            queue_authorization: non_empty_var("QUEUE_AUTHORIZATION"),

            queue_host: non_empty_var("QUEUE_PROXY_HOST"),

            queue_backoff_ms: parse_var("QUEUE_BACKOFF_MS", 8000),

            downstream_addr: env::var("DOWNSTREAM_ADDR")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),

            downstream_host: env::var("DOWNSTREAM_HOST")
                .unwrap_or_else(|_| "cms-notifier".to_string()),

            downstream_endpoint: env::var("DOWNSTREAM_ENDPOINT")
                .unwrap_or_else(|_| "/notify".to_string()),

            downstream_authorization: non_empty_var("DOWNSTREAM_AUTHORIZATION"),

            num_consumers: parse_var("NUM_CONSUMERS", 1),

            max_in_flight: env::var("MAX_IN_FLIGHT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0),

            consumer_start_delay_ms: parse_var("CONSUMER_START_DELAY_MS", 0),

            shutdown_grace_ms: parse_var("SHUTDOWN_GRACE_MS", 10_000),

            request_timeout_ms: parse_var("REQUEST_TIMEOUT_MS", 60_000),

            health_timeout_ms: parse_var("HEALTH_TIMEOUT_MS", 4500),

            pool_max_idle_per_host: parse_var("POOL_MAX_IDLE_PER_HOST", 100),

            tcp_keepalive_secs: parse_var("TCP_KEEPALIVE_SECS", 30),

            port: parse_var("PORT", 8080),
        }
    }

    /// Check the settings needed to start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_addrs.is_empty() {
            return Err(ConfigError::Missing("QUEUE_PROXY_ADDRS"));
        }
        for addr in &self.queue_addrs {
            check_url("QUEUE_PROXY_ADDRS", addr)?;
        }
        if self.queue_group.trim().is_empty() {
            return Err(ConfigError::Missing("QUEUE_GROUP"));
        }
        if self.queue_topic.trim().is_empty() {
            return Err(ConfigError::Missing("QUEUE_TOPIC"));
        }
        if self.downstream_addr.trim().is_empty() {
            return Err(ConfigError::Missing("DOWNSTREAM_ADDR"));
        }
        check_url("DOWNSTREAM_ADDR", &self.downstream_addr)?;
        if self.downstream_host.trim().is_empty() {
            return Err(ConfigError::Missing("DOWNSTREAM_HOST"));
        }
        if self.num_consumers == 0 {
            return Err(ConfigError::Zero("NUM_CONSUMERS"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Zero("REQUEST_TIMEOUT_MS"));
        }
        if self.health_timeout_ms == 0 {
            return Err(ConfigError::Zero("HEALTH_TIMEOUT_MS"));
        }
        Ok(())
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            tcp_keepalive: Duration::from_secs(self.tcp_keepalive_secs),
            pool_max_idle_per_host: self.pool_max_idle_per_host,
        }
    }

    pub fn proxy_settings(&self) -> ProxySettings {
        ProxySettings {
            addrs: self.queue_addrs.clone(),
            group: self.queue_group.clone(),
            topic: self.queue_topic.clone(),
            offset: self.queue_offset.clone(),
            auto_commit: self.queue_auto_commit,
            authorization: self.queue_authorization.clone(),
            host: self.queue_host.clone(),
        }
    }

    pub fn queue_probe(&self) -> QueueProbeSettings {
        QueueProbeSettings {
            addrs: self.queue_addrs.clone(),
            topic: self.queue_topic.clone(),
            authorization: self.queue_authorization.clone(),
            host: self.queue_host.clone(),
        }
    }

    pub fn downstream(&self) -> DownstreamTarget {
        DownstreamTarget {
            addr: self.downstream_addr.trim_end_matches('/').to_string(),
            host: self.downstream_host.clone(),
            endpoint: self.downstream_endpoint.clone(),
            authorization: self.downstream_authorization.clone(),
        }
    }

    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            backoff: Duration::from_millis(self.queue_backoff_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            max_in_flight: self.max_in_flight,
        }
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

fn check_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            name,
            value: value.to_string(),
        }),
    }
}

/// Parse a numeric variable, warning and falling back on bad input.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(env_var = name, value = %raw, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a boolean variable (`true/false`, `1/0`, `yes/no`).
fn parse_bool(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean, using default");
            default
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
