//! Health aggregation.
//!
//! Two checks: the queue proxy (can we consume?) and the downstream
//! notifier (can we forward?). The full report always runs both; good-to-go
//! stops at the first failure.

pub mod probes;

use std::time::Duration;

use futures::future::{join, try_join};
use reqwest::Client;
use serde::Serialize;

use crate::forward::DownstreamTarget;

pub use probes::{check_topic_present, probe_downstream, probe_queue, ProbeError, QueueProbeSettings};

const PANIC_GUIDE: &str = "https://sites.google.com/a/ft.com/ft-technology-service-transition/home/run-book-library/kafka-bridge-run-book";

/// Static description of one check.
#[derive(Debug, Clone, Copy)]
pub struct CheckInfo {
    pub name: &'static str,
    pub business_impact: &'static str,
    pub technical_summary: &'static str,
    pub severity: u8,
}

pub const QUEUE_CHECK: CheckInfo = CheckInfo {
    name: "Consume from kafka through the proxy",
    business_impact: "Consuming messages through kafka-proxy won't work. Publishing in the containerised stack won't work.",
    technical_summary: "Consuming messages is broken. Check if kafka-proxy is reachable and the topic exists.",
    severity: 1,
};

pub const DOWNSTREAM_CHECK: CheckInfo = CheckInfo {
    name: "Forward messages to cms-notifier",
    business_impact: "Forwarding messages to cms-notifier won't work. Publishing in the containerised stack won't work.",
    technical_summary: "Forwarding messages is broken. Check networking, cluster reachability and/or cms-notifier state.",
    severity: 1,
};

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub name: String,
    pub ok: bool,
    pub severity: u8,
    pub business_impact: String,
    pub technical_summary: String,
    pub panic_guide: String,
    #[serde(rename = "checkOutput")]
    pub detail: String,
}

impl HealthStatus {
    fn from_result(info: &CheckInfo, result: Result<String, String>) -> Self {
        let (ok, detail) = match result {
            Ok(detail) => (true, detail),
            Err(detail) => (false, detail),
        };
        Self {
            name: info.name.to_string(),
            ok,
            severity: info.severity,
            business_impact: info.business_impact.to_string(),
            technical_summary: info.technical_summary.to_string(),
            panic_guide: PANIC_GUIDE.to_string(),
            detail,
        }
    }
}

/// The document served on `/__health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub schema_version: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub ok: bool,
    /// Most severe (lowest) severity among failing checks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    pub checks: Vec<HealthStatus>,
}

impl HealthReport {
    pub fn new(checks: Vec<HealthStatus>) -> Self {
        let ok = checks.iter().all(|c| c.ok);
        let severity = checks.iter().filter(|c| !c.ok).map(|c| c.severity).min();
        Self {
            schema_version: 1,
            name: "kafka-bridge",
            description: "Relays messages from the kafka proxy to cms-notifier",
            ok,
            severity,
            checks,
        }
    }
}

/// Probes the bridge's two dependencies.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    client: Client,
    queue: QueueProbeSettings,
    downstream: DownstreamTarget,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(
        client: Client,
        queue: QueueProbeSettings,
        downstream: DownstreamTarget,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            queue,
            downstream,
            timeout,
        }
    }

    async fn check_queue(&self) -> Result<String, String> {
        probe_queue(&self.client, &self.queue, self.timeout).await
    }

    async fn check_downstream(&self) -> Result<String, String> {
        probe_downstream(&self.client, &self.downstream, self.timeout).await
    }

    /// Run both checks concurrently and report each one.
    pub async fn health_report(&self) -> Vec<HealthStatus> {
        let (queue, downstream) = join(self.check_queue(), self.check_downstream()).await;
        vec![
            HealthStatus::from_result(&QUEUE_CHECK, queue),
            HealthStatus::from_result(&DOWNSTREAM_CHECK, downstream),
        ]
    }

    /// `Ok` only if both checks pass; returns the first failure seen.
    pub async fn good_to_go(&self) -> Result<(), String> {
        try_join(self.check_queue(), self.check_downstream())
            .await
            .map(|_| ())
    }
}
