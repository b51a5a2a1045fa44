//! Delivery capabilities, one trait per channel, and their concrete clients.

mod plain;
mod resend;
mod smsaero;
mod telegram;

pub use plain::LogPlainSender;
pub use resend::ResendEmailSender;
pub use smsaero::SmsAeroSender;
pub use telegram::TelegramBotSender;

use async_trait::async_trait;
use herald_payloads::{ParseMode, TelegramPayload};

use crate::SendError;

#[async_trait]
pub trait PlainSender: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), SendError>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_text(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError>;

    async fn send_html(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError>;
}

/// Optional `sendMessage` parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelegramOptions {
    pub parse_mode: Option<ParseMode>,
    pub disable_web_page_preview: Option<bool>,
    pub disable_notification: Option<bool>,
    pub protect_content: Option<bool>,
}

impl From<&TelegramPayload> for TelegramOptions {
    fn from(p: &TelegramPayload) -> Self {
        Self {
            parse_mode: p.parse_mode,
            disable_web_page_preview: p.disable_web_page_preview,
            disable_notification: p.disable_notification,
            protect_content: p.protect_content,
        }
    }
}

#[async_trait]
pub trait TelegramSender: Send + Sync {
    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        options: &TelegramOptions,
    ) -> Result<(), SendError>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, phone: &str, text: &str) -> Result<(), SendError>;
}

/// Turn a non-2xx response into [`SendError::Rejected`].
pub(crate) async fn ensure_success(
    channel: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, SendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(channel, status = status.as_u16(), body = %body, "Delivery rejected");
    Err(SendError::Rejected {
        channel,
        status: status.as_u16(),
        body,
    })
}
