use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::ZulipConfig;
use crate::dispatch::DeliveryClient;
use crate::message::OutboundPayload;

/// Zulip's response to a send-message request.
#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    pub result: String,
    /// Id of the newly created message, present on success.
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl SendResponse {
    pub fn is_success(&self) -> bool {
        self.result == "success"
    }
}

/// Zulip's response to an update-message (PATCH) request.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateResponse {
    pub result: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl UpdateResponse {
    pub fn is_success(&self) -> bool {
        self.result == "success"
    }
}

/// HTTP client for the Zulip REST API, authenticated as a bot user.
pub struct ZulipClient {
    client: reqwest::Client,
    config: ZulipConfig,
}

impl ZulipClient {
    pub fn new(config: ZulipConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.config.site.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl DeliveryClient for ZulipClient {
    async fn send(&self, payload: &OutboundPayload) -> Result<SendResponse> {
        let url = self.api_url("messages");
        debug!("Sending message to Zulip: {}", url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.email, Some(&self.config.api_key))
            .form(&[
                ("type", "stream"),
                ("to", payload.stream.as_str()),
                ("topic", payload.topic.as_str()),
                ("content", payload.content.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request to Zulip")?;

        response
            .json()
            .await
            .context("Failed to parse Zulip send response")
    }

    async fn update(&self, zulip_id: i64, content: &str) -> Result<UpdateResponse> {
        let url = self.api_url(&format!("messages/{zulip_id}"));
        debug!("Updating Zulip message {}", zulip_id);

        let response = self
            .client
            .patch(&url)
            .basic_auth(&self.config.email, Some(&self.config.api_key))
            .form(&[("content", content)])
            .send()
            .await
            .context("Failed to send update request to Zulip")?;

        response
            .json()
            .await
            .context("Failed to parse Zulip update response")
    }
}
