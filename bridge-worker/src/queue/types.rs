//! Queue message types.
//!
//! This module defines:
//! - [`Message`]: one decoded queue message handed to the forwarder
//! - [`ProxyRecord`] / [`ConsumerInstance`]: wire types of the queue proxy's consumer API

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content type for consumer-instance management requests.
pub const PROXY_V1_CONTENT_TYPE: &str = "application/vnd.kafka.v1+json";

/// Accept header for fetching records with base64 encoded values.
pub const PROXY_BINARY_ACCEPT: &str = "application/vnd.kafka.binary.v1+json";

/// A message read from the queue.
///
/// Header keys are case sensitive; repeated headers are not modelled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl Message {
    pub fn new(headers: HashMap<String, String>, body: impl Into<String>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }
}

/// Request body for creating a consumer instance.
#[derive(Debug, Clone, Serialize)]
pub struct CreateConsumerRequest {
    #[serde(rename = "auto.offset.reset")]
    pub auto_offset_reset: String,
    #[serde(rename = "auto.commit.enable")]
    pub auto_commit_enable: String,
}

/// Consumer instance handed out by the proxy.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerInstance {
    pub instance_id: String,
    #[serde(default)]
    pub base_uri: Option<String>,
}

/// One record returned by a topic fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyRecord {
    /// Base64 encoded message frame.
    pub value: Option<String>,
    #[serde(default)]
    pub partition: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// Failures talking to the queue proxy.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no queue proxy address configured")]
    NoAddresses,

    #[error("request to queue proxy failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("queue proxy {url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("unreadable message frame: {0}")]
    Frame(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_consumer_request_serialization() {
        let req = CreateConsumerRequest {
            auto_offset_reset: "largest".to_string(),
            auto_commit_enable: "true".to_string(),
        };

        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"auto.offset.reset":"largest","auto.commit.enable":"true"}"#);
    }

    #[test]
    fn test_consumer_instance_deserialization() {
        let json = r#"{"instance_id":"rest-consumer-1","base_uri":"http://proxy/consumers/g/instances/rest-consumer-1"}"#;
        let instance: ConsumerInstance = serde_json::from_str(json).unwrap();
        assert_eq!(instance.instance_id, "rest-consumer-1");
        assert!(instance.base_uri.is_some());

        let minimal: ConsumerInstance = serde_json::from_str(r#"{"instance_id":"x"}"#).unwrap();
        assert_eq!(minimal.base_uri, None);
    }

    #[test]
    fn test_proxy_record_deserialization() {
        let json = r#"[{"value":"RlRNU0cvMS4w","partition":0,"offset":12},{"value":null}]"#;
        let records: Vec<ProxyRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, Some(12));
        assert!(records[1].value.is_none());
    }
}
