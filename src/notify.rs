//! Completion notifiers.
//!
//! [`LogNotifier`] records each committed block through `tracing`.
//! [`WebhookNotifier`] POSTs it as JSON to an HTTP endpoint, the way the
//! dashboard backend expects to receive growth updates:
//!
//! ```json
//! { "plantName": "Cucumber", "block": { "globalAreaPixels": 1520, ... } }
//! ```

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::config::NotifierConfig;
use crate::models::Block;
use crate::traits::CompletionNotifier;

/// Body sent to webhook endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload<'a> {
    pub plant_name: &'a str,
    pub block: &'a Block,
}

/// Logs completed blocks at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl CompletionNotifier for LogNotifier {
    async fn notify(&self, plant: &str, block: &Block) -> Result<()> {
        tracing::info!(
            plant = %plant,
            area = block.global_area_pixels,
            growth = block.global_growth,
            growth_percent = block.global_growth_percent,
            disease = %block.disease_class,
            "capture round completed"
        );
        Ok(())
    }
}

/// POSTs completed blocks to an HTTP endpoint.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Build from config; `None` when no webhook URL is set.
    pub fn from_config(config: &NotifierConfig) -> Result<Option<Self>> {
        match &config.webhook_url {
            Some(url) => Ok(Some(Self::new(
                url.clone(),
                Duration::from_secs(config.timeout_secs),
            )?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CompletionNotifier for WebhookNotifier {
    async fn notify(&self, plant: &str, block: &Block) -> Result<()> {
        let payload = CompletionPayload {
            plant_name: plant,
            block,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Webhook {} unreachable", self.url))?;

        if !resp.status().is_success() {
            bail!("Webhook {} returned HTTP {}", self.url, resp.status());
        }
        Ok(())
    }
}
