//! Queue module for reading messages through the Kafka REST proxy.
//!
//! This module provides:
//! - The [`MessageSource`] seam the consume loop polls
//! - [`ProxyConsumer`], a consumer-instance client for the proxy
//! - Frame decoding for the records the proxy returns
//!
//! ## Architecture
//!
//! ```text
//! Kafka → REST proxy → ProxyConsumer → consume loop → Forwarder → notifier
//! ```

pub mod frame;
pub mod proxy;
pub mod types;

use async_trait::async_trait;

pub use frame::{decode_record, parse_frame};
pub use proxy::{ProxyConsumer, ProxySettings};
pub use types::{Message, QueueError};

/// A pollable source of queue messages.
///
/// Implementations own their connection state; the consume loop is the only
/// caller and never shares a source between tasks.
#[async_trait]
pub trait MessageSource: Send {
    /// Fetch the next batch. An empty batch means nothing is available yet.
    async fn fetch(&mut self) -> Result<Vec<Message>, QueueError>;

    /// Acknowledge everything fetched so far.
    async fn commit(&mut self) -> Result<(), QueueError> {
        Ok(())
    }

    /// Release any server-side resources held by the source.
    async fn close(&mut self) {}
}
