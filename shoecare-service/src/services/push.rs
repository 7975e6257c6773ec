//! Push-notification collaborator client.
//!
//! Delivery is strictly best-effort: a failed push is logged and never
//! propagated to the request that triggered it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use service_core::error::AppError;
use std::time::Duration;

use crate::config::PushConfig;

#[async_trait]
pub trait PushApi: Send + Sync {
    async fn notify(&self, recipient: &str, title: &str, body: &str) -> Result<(), AppError>;
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    recipient: &'a str,
    title: &'a str,
    body: &'a str,
}

/// HTTP client for the notification service. Disabled (no-op) when no
/// endpoint is configured.
#[derive(Clone)]
pub struct HttpPush {
    client: Client,
    base_url: Option<String>,
}

impl HttpPush {
    pub fn new(config: &PushConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build push HTTP client");
        if config.base_url.is_none() {
            tracing::warn!("push endpoint not configured, notifications disabled");
        }
        Self {
            client,
            base_url: config
                .base_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
        }
    }
}

#[async_trait]
impl PushApi for HttpPush {
    async fn notify(&self, recipient: &str, title: &str, body: &str) -> Result<(), AppError> {
        let Some(base_url) = &self.base_url else {
            return Ok(());
        };
        let url = format!("{base_url}/notifications");
        let response = self
            .client
            .post(&url)
            .json(&PushRequest {
                recipient,
                title,
                body,
            })
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("notification service unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::BadGateway(format!(
                "notification service returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
