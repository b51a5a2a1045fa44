use async_trait::async_trait;
use herald_payloads::ParseMode;
use serde::Serialize;

use super::{TelegramOptions, TelegramSender, ensure_success};
use crate::SendError;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// `sendMessage` request body.
#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disable_web_page_preview: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disable_notification: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protect_content: Option<bool>,
}

fn api_parse_mode(mode: ParseMode) -> &'static str {
    match mode {
        ParseMode::Markdown => "Markdown",
        ParseMode::Html => "HTML",
    }
}

/// Telegram Bot API client.
#[derive(Debug, Clone)]
pub struct TelegramBotSender {
    client: reqwest::Client,
    bot_token: String,
    base_url: String,
}

impl TelegramBotSender {
    pub fn new(client: reqwest::Client, bot_token: impl Into<String>) -> Self {
        Self {
            client,
            bot_token: bot_token.into(),
            base_url: TELEGRAM_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl TelegramSender for TelegramBotSender {
    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        options: &TelegramOptions,
    ) -> Result<(), SendError> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: options.parse_mode.map(api_parse_mode),
            disable_web_page_preview: options.disable_web_page_preview,
            disable_notification: options.disable_notification,
            protect_content: options.protect_content,
        };

        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let response = self.client.post(url).json(&request).send().await?;
        let response = ensure_success("telegram", response).await?;

        let body: serde_json::Value = response.json().await?;
        if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(SendError::Channel(format!(
                "telegram sendMessage not ok: {body}"
            )));
        }

        tracing::debug!(chat_id, "Telegram message sent");
        Ok(())
    }
}
