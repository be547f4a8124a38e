//! Kafka bridge - relays queue messages to the downstream notifier.
//!
//! This library provides the modules behind the `kafka-bridge` binary:
//! - `queue`: consumer-instance client for the Kafka REST proxy
//! - `extract`: transaction id / origin system / uuid extraction
//! - `forward`: one message in, one `POST` out
//! - `consumer`: the poll loop that dispatches forwards concurrently
//! - `health`: dependency checks behind `/__health` and `/__gtg`
//!
//! ## Architecture
//!
//! ```text
//! Kafka → REST proxy → consume loop → (task per message) Forwarder → cms-notifier
//! ```

pub mod config;
pub mod consumer;
pub mod extract;
pub mod forward;
pub mod health;
pub mod http;
pub mod queue;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use consumer::{run_consumer, ConsumerSettings, ConsumerStats};
pub use extract::{Extraction, ExtractError};
pub use forward::{DownstreamTarget, ForwardOutcome, Forwarder};
pub use health::{HealthChecker, HealthReport, HealthStatus};
pub use http::HttpSettings;
pub use queue::{Message, MessageSource, ProxyConsumer, QueueError};
pub use web::AppState;
