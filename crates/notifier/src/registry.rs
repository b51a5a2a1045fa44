use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use herald_common::config::AppConfig;
use herald_common::types::{NotificationType, Payload};

use crate::channels::{ChannelHandler, EmailChannel, PlainChannel, SmsChannel, TelegramChannel};
use crate::senders::{LogPlainSender, ResendEmailSender, SmsAeroSender, TelegramBotSender};
use crate::{DispatchError, SendError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Dispatch table: one handler per notification type, built once at startup.
pub struct SenderRegistry {
    handlers: HashMap<NotificationType, Box<dyn ChannelHandler>>,
}

impl SenderRegistry {
    /// An empty table. Every dispatch fails with `NoHandler` until handlers
    /// are registered.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Build the table from configuration. The plain channel is always present;
    /// the others are registered only when their credentials are set.
    pub fn from_config(config: &AppConfig) -> Result<Self, SendError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let mut registry =
            Self::new().with_handler(PlainChannel::new(Arc::new(LogPlainSender::new())));

        if let (Some(api_key), Some(from)) = (&config.resend_api_key, &config.email_from) {
            let sender = ResendEmailSender::new(client.clone(), api_key, from);
            registry.register(EmailChannel::new(Arc::new(sender)));
        }

        if let Some(token) = &config.telegram_bot_token {
            let sender = TelegramBotSender::new(client.clone(), token);
            registry.register(TelegramChannel::new(Arc::new(sender)));
        }

        if let (Some(email), Some(api_key)) = (&config.smsaero_email, &config.smsaero_api_key) {
            let sender = SmsAeroSender::new(client, email, api_key);
            registry.register(SmsChannel::new(Arc::new(sender)));
        }

        tracing::info!(
            channels = ?registry.channels(),
            "Sender registry initialized"
        );
        Ok(registry)
    }

    pub fn with_handler(mut self, handler: impl ChannelHandler + 'static) -> Self {
        self.register(handler);
        self
    }

    /// Register `handler` for its channel, replacing any previous one.
    pub fn register(&mut self, handler: impl ChannelHandler + 'static) {
        let channel = handler.channel();
        if self.handlers.insert(channel, Box::new(handler)).is_some() {
            tracing::warn!(channel = %channel, "Replaced existing channel handler");
        }
    }

    /// Registered channels, in declaration order of [`NotificationType`].
    pub fn channels(&self) -> Vec<NotificationType> {
        NotificationType::ALL
            .into_iter()
            .filter(|t| self.handlers.contains_key(t))
            .collect()
    }

    pub fn supports(&self, kind: NotificationType) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Route `payload` to the handler for `kind`.
    pub async fn dispatch(
        &self,
        kind: NotificationType,
        payload: &Payload,
    ) -> Result<(), DispatchError> {
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(DispatchError::NoHandler(kind))?;
        handler.dispatch(payload).await
    }
}

impl Default for SenderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::senders::PlainSender;

    #[derive(Default)]
    struct CountingPlain {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl PlainSender for CountingPlain {
        async fn send(&self, _message: &str) -> Result<(), SendError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn plain(message: &str) -> Payload {
        Payload::new().with("message", message)
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_handler() {
        let sender = Arc::new(CountingPlain::default());
        let registry = SenderRegistry::new().with_handler(PlainChannel::new(sender.clone()));

        registry
            .dispatch(NotificationType::Plain, &plain("hello"))
            .await
            .unwrap();

        assert_eq!(sender.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregistered_type_is_hard_error() {
        let registry = SenderRegistry::new();
        let err = registry
            .dispatch(NotificationType::Sms, &plain("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoHandler(NotificationType::Sms)));
    }

    #[tokio::test]
    async fn test_validation_runs_before_send() {
        let sender = Arc::new(CountingPlain::default());
        let registry = SenderRegistry::new().with_handler(PlainChannel::new(sender.clone()));

        let err = registry
            .dispatch(NotificationType::Plain, &Payload::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Validation(_)));
        assert_eq!(sender.sent.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_from_config_registers_plain_only_by_default() {
        let config = AppConfig::minimal("postgres://localhost/herald", "secret");
        let registry = SenderRegistry::from_config(&config).unwrap();
        assert_eq!(registry.channels(), vec![NotificationType::Plain]);
    }

    #[test]
    fn test_from_config_registers_configured_channels() {
        let mut config = AppConfig::minimal("postgres://localhost/herald", "secret");
        config.telegram_bot_token = Some("123:abc".into());
        // Email stays unregistered: `email_from` is unset.
        config.resend_api_key = Some("re_key".into());
        config.smsaero_email = Some("ops@example.com".into());
        config.smsaero_api_key = Some("key".into());

        let registry = SenderRegistry::from_config(&config).unwrap();
        assert_eq!(
            registry.channels(),
            vec![
                NotificationType::Plain,
                NotificationType::Sms,
                NotificationType::Telegram
            ]
        );
        assert!(!registry.supports(NotificationType::Email));
    }
}
