//! Consumer-instance client for the Kafka REST proxy.
//!
//! The proxy hands out a consumer instance per `POST /consumers/{group}`.
//! Records are then read with `GET .../instances/{id}/topics/{topic}`,
//! optionally committed with `POST .../offsets`, and the instance is released
//! with `DELETE .../instances/{id}`.
//!
//! A failed fetch drops the instance; the next fetch creates a fresh one,
//! rotating through the configured proxy addresses.

use async_trait::async_trait;
use reqwest::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HOST},
    Client, Method, RequestBuilder, StatusCode,
};
use tracing::{debug, info, warn};

use super::frame::decode_record;
use super::types::{
    ConsumerInstance, CreateConsumerRequest, Message, ProxyRecord, QueueError,
    PROXY_BINARY_ACCEPT, PROXY_V1_CONTENT_TYPE,
};
use super::MessageSource;

/// Connection settings for the queue proxy.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Proxy base addresses, tried in order.
    pub addrs: Vec<String>,
    /// Consumer group name
    pub group: String,
    /// Topic to read
    pub topic: String,
    /// `auto.offset.reset` for new instances (`largest` or `smallest`)
    pub offset: String,
    /// Let the proxy commit offsets on fetch
    pub auto_commit: bool,
    /// Value for the `Authorization` header
    pub authorization: Option<String>,
    /// Logical host name to send in the `Host` header
    pub host: Option<String>,
}

/// Polls one consumer instance on the proxy.
pub struct ProxyConsumer {
    client: Client,
    settings: ProxySettings,
    instance_url: Option<String>,
    next_addr: usize,
}

impl ProxyConsumer {
    /// Create a consumer; no instance is created until the first fetch.
    pub fn new(client: Client, settings: ProxySettings) -> Self {
        Self {
            client,
            settings,
            instance_url: None,
            next_addr: 0,
        }
    }

    /// URL of the current consumer instance, if one exists.
    pub fn instance_url(&self) -> Option<&str> {
        self.instance_url.as_deref()
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut request = self.client.request(method, url);
        if let Some(auth) = &self.settings.authorization {
            request = request.header(AUTHORIZATION, auth.as_str());
        }
        if let Some(host) = &self.settings.host {
            request = request.header(HOST, host.as_str());
        }
        request
    }

    /// Return the current instance URL, creating an instance if needed.
    async fn ensure_instance(&mut self) -> Result<String, QueueError> {
        if let Some(url) = &self.instance_url {
            return Ok(url.clone());
        }

        let count = self.settings.addrs.len();
        let mut last_error = QueueError::NoAddresses;

        for _ in 0..count {
            let addr = self.settings.addrs[self.next_addr % count].clone();
            match self.create_instance(&addr).await {
                Ok(url) => {
                    info!(proxy = %addr, instance = %url, "queue_consumer_created");
                    self.instance_url = Some(url.clone());
                    return Ok(url);
                }
                Err(e) => {
                    warn!(proxy = %addr, error = %e, "queue_consumer_create_failed");
                    self.next_addr = (self.next_addr + 1) % count;
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn create_instance(&self, addr: &str) -> Result<String, QueueError> {
        let addr = addr.trim_end_matches('/');
        let url = format!("{}/consumers/{}", addr, self.settings.group);
        let body = CreateConsumerRequest {
            auto_offset_reset: self.settings.offset.clone(),
            auto_commit_enable: self.settings.auto_commit.to_string(),
        };

        let resp = self
            .request(Method::POST, &url)
            .header(CONTENT_TYPE, PROXY_V1_CONTENT_TYPE)
            .json(&body)
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(QueueError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        let instance: ConsumerInstance = resp.json().await?;

        // base_uri points at the proxy's internal host name, so rebuild it
        // against the address we actually reached.
        Ok(format!("{}/instances/{}", url, instance.instance_id))
    }

    /// Best-effort release of the current instance.
    async fn destroy_instance(&mut self) {
        let Some(url) = self.instance_url.take() else {
            return;
        };

        match self.request(Method::DELETE, &url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(instance = %url, "queue_consumer_destroyed");
            }
            Ok(resp) => {
                warn!(instance = %url, status = resp.status().as_u16(), "queue_consumer_destroy_failed");
            }
            Err(e) => {
                warn!(instance = %url, error = %e, "queue_consumer_destroy_failed");
            }
        }
    }

    async fn fetch_records(&self, instance: &str) -> Result<Vec<ProxyRecord>, QueueError> {
        let url = format!("{}/topics/{}", instance, self.settings.topic);
        let resp = self
            .request(Method::GET, &url)
            .header(ACCEPT, PROXY_BINARY_ACCEPT)
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(QueueError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        Ok(resp.json().await?)
    }
}

/// Decode records, skipping any that cannot be read.
fn decode_records(records: Vec<ProxyRecord>) -> Vec<Message> {
    records
        .into_iter()
        .filter_map(|record| {
            let Some(value) = record.value else {
                warn!(
                    partition = ?record.partition,
                    offset = ?record.offset,
                    "queue_record_skipped_null_value"
                );
                return None;
            };
            match decode_record(&value) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(
                        partition = ?record.partition,
                        offset = ?record.offset,
                        error = %e,
                        "queue_record_skipped"
                    );
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl MessageSource for ProxyConsumer {
    async fn fetch(&mut self) -> Result<Vec<Message>, QueueError> {
        let instance = self.ensure_instance().await?;

        match self.fetch_records(&instance).await {
            Ok(records) => {
                let fetched = records.len();
                let messages = decode_records(records);
                debug!(fetched = fetched, decoded = messages.len(), "queue_records_fetched");
                Ok(messages)
            }
            Err(e) => {
                self.destroy_instance().await;
                Err(e)
            }
        }
    }

    async fn commit(&mut self) -> Result<(), QueueError> {
        if self.settings.auto_commit {
            return Ok(());
        }
        let Some(instance) = self.instance_url.clone() else {
            return Ok(());
        };

        let url = format!("{}/offsets", instance);
        let resp = self
            .request(Method::POST, &url)
            .header(CONTENT_TYPE, PROXY_V1_CONTENT_TYPE)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(QueueError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.destroy_instance().await;
    }
}
