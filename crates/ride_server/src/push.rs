use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use ride_core::error::RideError;
use ride_core::notify::{PushMessage, PushNotifier};
use tracing::debug;

/// Posts each push as JSON to a fixed webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build push http client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PushNotifier for WebhookNotifier {
    async fn notify(&self, message: PushMessage) -> Result<(), RideError> {
        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|err| RideError::Upstream(format!("push request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RideError::Upstream(format!("push webhook returned {status}")));
        }
        debug!(driver_id = %message.driver_id, event = %message.event, "push delivered");
        Ok(())
    }
}
