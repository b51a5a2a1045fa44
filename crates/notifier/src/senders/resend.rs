use async_trait::async_trait;
use serde_json::json;

use super::{EmailSender, ensure_success};
use crate::SendError;

const RESEND_API_URL: &str = "https://api.resend.com";

/// Email delivery through the Resend HTTP API.
#[derive(Debug, Clone)]
pub struct ResendEmailSender {
    client: reqwest::Client,
    api_key: String,
    from: String,
    base_url: String,
}

impl ResendEmailSender {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            from: from.into(),
            base_url: RESEND_API_URL.to_string(),
        }
    }

    /// Point the client at another host (used against mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn deliver(&self, body: serde_json::Value) -> Result<(), SendError> {
        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        ensure_success("resend", response).await?;
        tracing::debug!(to = %body["to"], "Email accepted by Resend");
        Ok(())
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send_text(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError> {
        self.deliver(json!({
            "from": self.from,
            "to": [to],
            "subject": subject,
            "text": body,
        }))
        .await
    }

    async fn send_html(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError> {
        self.deliver(json!({
            "from": self.from,
            "to": [to],
            "subject": subject,
            "html": body,
        }))
        .await
    }
}
