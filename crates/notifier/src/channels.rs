//! Channel handlers: typed extraction plus a call into the channel's sender.

use std::sync::Arc;

use async_trait::async_trait;
use herald_common::types::{NotificationType, Payload};
use herald_payloads::{EmailPayload, PlainPayload, SmsPayload, TelegramPayload, TypedPayload};

use crate::DispatchError;
use crate::senders::{EmailSender, PlainSender, SmsSender, TelegramOptions, TelegramSender};

/// Everything the dispatch table needs to route one notification type.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    fn channel(&self) -> NotificationType;

    /// Validate `payload` for this channel and deliver it.
    async fn dispatch(&self, payload: &Payload) -> Result<(), DispatchError>;
}

pub struct PlainChannel {
    sender: Arc<dyn PlainSender>,
}

impl PlainChannel {
    pub fn new(sender: Arc<dyn PlainSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ChannelHandler for PlainChannel {
    fn channel(&self) -> NotificationType {
        PlainPayload::KIND
    }

    async fn dispatch(&self, payload: &Payload) -> Result<(), DispatchError> {
        let plain = PlainPayload::parse(payload)?;
        self.sender.send(&plain.message).await?;
        Ok(())
    }
}

pub struct EmailChannel {
    sender: Arc<dyn EmailSender>,
}

impl EmailChannel {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ChannelHandler for EmailChannel {
    fn channel(&self) -> NotificationType {
        EmailPayload::KIND
    }

    async fn dispatch(&self, payload: &Payload) -> Result<(), DispatchError> {
        let email = EmailPayload::parse(payload)?;
        if email.is_html {
            self.sender
                .send_html(&email.to, &email.subject, &email.body)
                .await?;
        } else {
            self.sender
                .send_text(&email.to, &email.subject, &email.body)
                .await?;
        }
        Ok(())
    }
}

pub struct TelegramChannel {
    sender: Arc<dyn TelegramSender>,
}

impl TelegramChannel {
    pub fn new(sender: Arc<dyn TelegramSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ChannelHandler for TelegramChannel {
    fn channel(&self) -> NotificationType {
        TelegramPayload::KIND
    }

    async fn dispatch(&self, payload: &Payload) -> Result<(), DispatchError> {
        let tg = TelegramPayload::parse(payload)?;
        let options = TelegramOptions::from(&tg);
        self.sender.send(&tg.chat_id, &tg.text, &options).await?;
        Ok(())
    }
}

pub struct SmsChannel {
    sender: Arc<dyn SmsSender>,
}

impl SmsChannel {
    pub fn new(sender: Arc<dyn SmsSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ChannelHandler for SmsChannel {
    fn channel(&self) -> NotificationType {
        SmsPayload::KIND
    }

    async fn dispatch(&self, payload: &Payload) -> Result<(), DispatchError> {
        let sms = SmsPayload::parse(payload)?;
        self.sender.send(&sms.phone, &sms.text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::SendError;

    #[derive(Default)]
    struct RecordingEmail {
        calls: Mutex<Vec<(&'static str, String)>>,
    }

    #[async_trait]
    impl EmailSender for RecordingEmail {
        async fn send_text(&self, to: &str, _: &str, _: &str) -> Result<(), SendError> {
            self.calls.lock().unwrap().push(("text", to.to_string()));
            Ok(())
        }

        async fn send_html(&self, to: &str, _: &str, _: &str) -> Result<(), SendError> {
            self.calls.lock().unwrap().push(("html", to.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTelegram {
        calls: Mutex<Vec<TelegramOptions>>,
    }

    #[async_trait]
    impl TelegramSender for RecordingTelegram {
        async fn send(&self, _: &str, _: &str, options: &TelegramOptions) -> Result<(), SendError> {
            self.calls.lock().unwrap().push(*options);
            Ok(())
        }
    }

    fn email_payload(to: &str) -> Payload {
        Payload::new()
            .with("to", to)
            .with("subject", "s")
            .with("body", "b")
    }

    #[tokio::test]
    async fn test_email_html_flag_selects_method() {
        let sender = Arc::new(RecordingEmail::default());
        let channel = EmailChannel::new(sender.clone());

        channel.dispatch(&email_payload("a@b.io")).await.unwrap();
        channel
            .dispatch(&email_payload("a@b.io").with("is_html", "true"))
            .await
            .unwrap();

        let calls = sender.calls.lock().unwrap();
        assert_eq!(calls[0].0, "text");
        assert_eq!(calls[1].0, "html");
    }

    #[tokio::test]
    async fn test_invalid_email_never_reaches_sender() {
        let sender = Arc::new(RecordingEmail::default());
        let channel = EmailChannel::new(sender.clone());

        let err = channel
            .dispatch(&email_payload("bad-address"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(sender.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_telegram_options_forwarded() {
        let sender = Arc::new(RecordingTelegram::default());
        let channel = TelegramChannel::new(sender.clone());
        let payload = Payload::new()
            .with("chat_id", "42")
            .with("text", "hi")
            .with("parse_mode", "markdown")
            .with("protect_content", "yes");

        channel.dispatch(&payload).await.unwrap();

        let calls = sender.calls.lock().unwrap();
        assert_eq!(calls[0].parse_mode, Some(herald_payloads::ParseMode::Markdown));
        assert_eq!(calls[0].protect_content, Some(true));
        assert_eq!(calls[0].disable_notification, None);
    }
}
