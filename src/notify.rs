//! Chat webhook notifier.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use askbase_core::notify::{NoopNotifier, Notification, Notifier};

use crate::config::NotifyConfig;

/// Posts `{"text": ...}` to a chat webhook (Google Chat, Slack-compatible).
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let body = serde_json::json!({ "text": notification.render_text() });
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json; charset=UTF-8")
            .json(&body)
            .send()
            .await
            .context("webhook request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("webhook returned {}: {}", status, text);
        }
        Ok(())
    }
}

/// Create the notifier selected by `config.provider`.
pub fn create_notifier(config: &NotifyConfig) -> Result<Arc<dyn Notifier>> {
    match config.provider.as_str() {
        "none" => Ok(Arc::new(NoopNotifier)),
        "webhook" => {
            let url = config
                .url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("notify.url required for webhook provider"))?;
            Ok(Arc::new(WebhookNotifier::new(url, config.timeout_secs)?))
        }
        other => bail!("Unknown notify provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_requires_url() {
        let config = NotifyConfig {
            provider: "webhook".to_string(),
            url: None,
            timeout_secs: 5,
        };
        assert!(create_notifier(&config).is_err());
        assert!(create_notifier(&NotifyConfig::default()).is_ok());
    }
}
