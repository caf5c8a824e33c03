//! Message bus adapter.
//!
//! Publishes one message per call to a Pub/Sub topic through the REST
//! `:publish` endpoint.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

/// Attribute carrying the redelivery-stable key of a feed message
pub const IDEMPOTENCY_KEY_ATTRIBUTE: &str = "idempotencyKey";

/// Errors from a publish call
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publish request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Bus returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Publish rejected: {0}")]
    Rejected(String),
}

/// Message body plus attributes
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub data: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
}

impl OutboundMessage {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Trait for the output bus
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish one message, returning the bus-assigned id
    async fn publish(&self, topic: &str, message: OutboundMessage) -> Result<String, PublishError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Pub/Sub REST publisher
pub struct PubSubBus {
    /// e.g. https://pubsub.googleapis.com
    api_base: String,
    project_id: String,
    access_token: String,
    client: reqwest::Client,
}

impl PubSubBus {
    /// Create a new publisher for a project
    pub fn new(
        api_base: impl Into<String>,
        project_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build bus HTTP client")?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            access_token: access_token.into(),
            client,
        })
    }

    /// Fully qualified topic path
    pub fn topic_path(&self, topic: &str) -> String {
        format!("projects/{}/topics/{}", self.project_id, topic)
    }
}

#[async_trait]
impl MessageBus for PubSubBus {
    async fn publish(&self, topic: &str, message: OutboundMessage) -> Result<String, PublishError> {
        let url = format!("{}/v1/{}:publish", self.api_base, self.topic_path(topic));
        let body = serde_json::json!({
            "messages": [{
                "data": STANDARD.encode(&message.data),
                "attributes": message.attributes,
            }]
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: PublishResponse = response.json().await?;
        result
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| PublishError::Rejected(format!("no message id returned by {}", topic)))
    }
}
