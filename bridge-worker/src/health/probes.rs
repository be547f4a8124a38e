//! Dependency probes.
//!
//! Each probe makes short-timeout requests and reports a typed failure. The
//! queue probe succeeds as soon as one proxy address is usable.

use std::time::Duration;

use futures::future::join_all;
use reqwest::{
    header::{AUTHORIZATION, HOST},
    Client, StatusCode,
};
use thiserror::Error;
use tracing::warn;

use crate::forward::DownstreamTarget;

/// What the queue probe needs to know about the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueProbeSettings {
    pub addrs: Vec<String>,
    pub topic: String,
    pub authorization: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("could not connect: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("request was not successful, status: {0}")]
    Status(u16),

    #[error("connection could be established, but the topic list could not be parsed: {0}")]
    Unparsable(String),

    #[error("connection could be established, but topic {0} was not found")]
    TopicMissing(String),
}

/// Check the proxy lists the configured topic on at least one address.
///
/// All addresses are tried concurrently. On failure the message lists the
/// error seen for each address.
pub async fn probe_queue(
    client: &Client,
    settings: &QueueProbeSettings,
    timeout: Duration,
) -> Result<String, String> {
    if settings.addrs.is_empty() {
        return Err("no queue proxy address configured".to_string());
    }

    let results = join_all(
        settings
            .addrs
            .iter()
            .map(|addr| probe_queue_address(client, addr, settings, timeout)),
    )
    .await;

    let mut failures = Vec::new();
    for (addr, result) in settings.addrs.iter().zip(results) {
        match result {
            Ok(()) => {
                return Ok(format!("topic {} is available through {}", settings.topic, addr));
            }
            Err(e) => {
                warn!(proxy = %addr, error = %e, "health_queue_probe_failed");
                failures.push(format!("for {} there is an error: {}", addr, e));
            }
        }
    }

    Err(failures.join("; "))
}

async fn probe_queue_address(
    client: &Client,
    addr: &str,
    settings: &QueueProbeSettings,
    timeout: Duration,
) -> Result<(), ProbeError> {
    let url = format!("{}/topics", addr.trim_end_matches('/'));
    let mut request = client.get(&url).timeout(timeout);
    if let Some(auth) = &settings.authorization {
        request = request.header(AUTHORIZATION, auth.as_str());
    }
    if let Some(host) = &settings.host {
        request = request.header(HOST, host.as_str());
    }

    let resp = request.send().await?;
    if resp.status() != StatusCode::OK {
        return Err(ProbeError::Status(resp.status().as_u16()));
    }

    let body = resp.bytes().await?;
    check_topic_present(&body, &settings.topic)
}

/// Look for `topic` in a JSON array of topic names.
pub fn check_topic_present(body: &[u8], topic: &str) -> Result<(), ProbeError> {
    let topics: Vec<String> =
        serde_json::from_slice(body).map_err(|e| ProbeError::Unparsable(e.to_string()))?;

    if topics.iter().any(|t| t == topic) {
        Ok(())
    } else {
        Err(ProbeError::TopicMissing(topic.to_string()))
    }
}

/// Check the downstream receiver's own health endpoint answers 200.
pub async fn probe_downstream(
    client: &Client,
    target: &DownstreamTarget,
    timeout: Duration,
) -> Result<String, String> {
    let url = target.health_url();
    let mut request = client
        .get(&url)
        .header(HOST, target.host.as_str())
        .timeout(timeout);
    if let Some(auth) = &target.authorization {
        request = request.header(AUTHORIZATION, auth.as_str());
    }

    let result = request.send().await;

    let failure = match result {
        Ok(resp) if resp.status() == StatusCode::OK => {
            return Ok(format!("{} is reachable", target.host));
        }
        Ok(resp) => ProbeError::Status(resp.status().as_u16()),
        Err(e) => ProbeError::from(e),
    };

    warn!(url = %url, host = %target.host, error = %failure, "health_downstream_probe_failed");
    Err(format!("request to {} ({}) failed: {}", url, target.host, failure))
}
