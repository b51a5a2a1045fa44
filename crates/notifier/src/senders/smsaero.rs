use async_trait::async_trait;

use super::{SmsSender, ensure_success};
use crate::SendError;

const SMSAERO_API_URL: &str = "https://gate.smsaero.ru";
const SIGN: &str = "SMS Aero";

/// SMS delivery through the SMS Aero v2 gateway.
#[derive(Debug, Clone)]
pub struct SmsAeroSender {
    client: reqwest::Client,
    email: String,
    api_key: String,
    base_url: String,
}

impl SmsAeroSender {
    pub fn new(client: reqwest::Client, email: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            email: email.into(),
            api_key: api_key.into(),
            base_url: SMSAERO_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SmsSender for SmsAeroSender {
    async fn send(&self, phone: &str, text: &str) -> Result<(), SendError> {
        let response = self
            .client
            .get(format!("{}/v2/sms/send", self.base_url))
            .basic_auth(&self.email, Some(&self.api_key))
            .query(&[("number", phone), ("text", text), ("sign", SIGN)])
            .send()
            .await?;
        let response = ensure_success("smsaero", response).await?;

        // The gateway answers 200 with `success: false` for business errors.
        let body: serde_json::Value = response.json().await?;
        match body.get("success").and_then(|v| v.as_bool()) {
            Some(true) => {
                tracing::debug!(phone, "SMS accepted by gateway");
                Ok(())
            }
            Some(false) => Err(SendError::Channel(format!("smsaero response is not success: {body}"))),
            None => Err(SendError::Channel(format!(
                "smsaero response has no boolean success attribute: {body}"
            ))),
        }
    }
}
