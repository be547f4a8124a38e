//! Message forwarding to the downstream notifier.
//!
//! Each queue message becomes exactly one `POST` to the notifier. Delivery is
//! best effort and at most once: the outcome is logged and dropped, never
//! retried.

use std::fmt;

use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE, HOST},
    Client, StatusCode,
};
use tracing::{error, info, warn};

use crate::extract::{
    extract_origin_system, extract_tid, extract_uuid, synthesize_tid, Extraction,
    ORIGIN_SYSTEM_HEADER, REQUEST_ID_HEADER,
};
use crate::queue::Message;

/// Outbound header carrying the origin system id.
pub const FORWARD_ORIGIN_HEADER: &str = "X-Origin-System-Id";

/// Where forwarded messages go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamTarget {
    /// Physical address (scheme, host, port), usually a load balancer
    pub addr: String,
    /// Logical service name sent as the `Host` header
    pub host: String,
    /// Path messages are posted to
    pub endpoint: String,
    /// `Authorization` value sent with forwards and health probes
    pub authorization: Option<String>,
}

impl DownstreamTarget {
    /// Full URL messages are posted to.
    pub fn forward_url(&self) -> String {
        join_url(&self.addr, &self.endpoint)
    }

    /// URL of the receiver's own health endpoint.
    pub fn health_url(&self) -> String {
        join_url(&self.addr, "/__health")
    }
}

fn join_url(addr: &str, path: &str) -> String {
    format!(
        "{}/{}",
        addr.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Result of one forward attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Downstream answered 200.
    Delivered,
    /// Downstream answered with any other status.
    Rejected(u16),
    /// The request never completed (connect, DNS, timeout).
    TransportFailure(String),
    /// The message could not be forwarded at all.
    Malformed(String),
}

impl ForwardOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ForwardOutcome::Delivered)
    }
}

impl fmt::Display for ForwardOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardOutcome::Delivered => write!(f, "delivered"),
            ForwardOutcome::Rejected(status) => write!(f, "rejected with status {}", status),
            ForwardOutcome::TransportFailure(e) => write!(f, "transport failure: {}", e),
            ForwardOutcome::Malformed(reason) => write!(f, "malformed: {}", reason),
        }
    }
}

/// Posts queue messages to the downstream notifier.
///
/// Holds no per-message state, so one instance is shared by every
/// concurrent forward task.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client,
    url: String,
    host: String,
    authorization: Option<String>,
}

impl Forwarder {
    pub fn new(client: Client, target: &DownstreamTarget) -> Self {
        Self {
            client,
            url: target.forward_url(),
            host: target.host.clone(),
            authorization: target.authorization.clone(),
        }
    }

    /// Forward a single message.
    ///
    /// A missing origin system drops the message without a request. A
    /// missing or malformed transaction id is replaced by a generated one.
    pub async fn forward(&self, message: Message) -> ForwardOutcome {
        let origin_system =
            match extract_origin_system(&message.headers).into_result(ORIGIN_SYSTEM_HEADER) {
                Ok(origin) => origin,
                Err(e) => {
                    error!(
                        request_id = ?message.headers.get(REQUEST_ID_HEADER),
                        reason = %e,
                        "forward_skipped_missing_origin"
                    );
                    return ForwardOutcome::Malformed(e.to_string());
                }
            };

        let tid = match extract_tid(&message.headers).into_result(REQUEST_ID_HEADER) {
            Ok(tid) => tid,
            Err(e) => {
                let tid = synthesize_tid();
                warn!(tid = %tid, reason = %e, "forward_tid_generated");
                tid
            }
        };

        if let Extraction::Found(uuid) = extract_uuid(&message.body) {
            info!(tid = %tid, origin_system = %origin_system, uuid = %uuid, "forward_message_received");
        } else {
            info!(tid = %tid, origin_system = %origin_system, "forward_message_received");
        }

        let mut request = self
            .client
            .post(&self.url)
            .header(HOST, self.host.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(FORWARD_ORIGIN_HEADER, origin_system.as_str())
            .header(REQUEST_ID_HEADER, tid.as_str());
        if let Some(auth) = &self.authorization {
            request = request.header(AUTHORIZATION, auth.as_str());
        }

        let result = request.body(message.body).send().await;

        match result {
            Ok(resp) if resp.status() == StatusCode::OK => {
                info!(tid = %tid, origin_system = %origin_system, "forward_delivered");
                ForwardOutcome::Delivered
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                error!(
                    tid = %tid,
                    origin_system = %origin_system,
                    status_code = status,
                    "forward_rejected"
                );
                ForwardOutcome::Rejected(status)
            }
            Err(e) => {
                warn!(
                    tid = %tid,
                    origin_system = %origin_system,
                    is_timeout = e.is_timeout(),
                    is_connect = e.is_connect(),
                    error = %e,
                    "forward_transport_failure"
                );
                ForwardOutcome::TransportFailure(e.to_string())
            }
        }
    }
}
