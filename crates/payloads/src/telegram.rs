use herald_common::types::{NotificationType, Payload};

use crate::bools::parse_bool;
use crate::{TypedPayload, ValidationError, optional, required};

/// Formatting applied by Telegram to the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
    Html,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::Markdown => "markdown",
            ParseMode::Html => "html",
        }
    }
}

/// A Telegram Bot API `sendMessage` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramPayload {
    /// Chat id or `@channelusername`.
    pub chat_id: String,
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub disable_web_page_preview: Option<bool>,
    pub disable_notification: Option<bool>,
    pub protect_content: Option<bool>,
}

fn optional_bool(payload: &Payload, field: &'static str) -> Result<Option<bool>, ValidationError> {
    optional(payload, field)
        .map(|raw| {
            parse_bool(raw).ok_or_else(|| {
                ValidationError::invalid(
                    NotificationType::Telegram,
                    field,
                    format!("'{raw}' is not a boolean"),
                )
            })
        })
        .transpose()
}

impl TryFrom<&Payload> for TelegramPayload {
    type Error = ValidationError;

    fn try_from(payload: &Payload) -> Result<Self, Self::Error> {
        let kind = Self::KIND;
        let chat_id = required(payload, kind, "chat_id")?;
        let text = required(payload, kind, "text")?;
        let parse_mode = match optional(payload, "parse_mode") {
            None => None,
            Some("markdown") => Some(ParseMode::Markdown),
            Some("html") => Some(ParseMode::Html),
            Some(other) => {
                return Err(ValidationError::invalid(
                    kind,
                    "parse_mode",
                    format!("unknown value '{other}'"),
                ));
            }
        };

        Ok(Self {
            chat_id,
            text,
            parse_mode,
            disable_web_page_preview: optional_bool(payload, "disable_web_page_preview")?,
            disable_notification: optional_bool(payload, "disable_notification")?,
            protect_content: optional_bool(payload, "protect_content")?,
        })
    }
}

impl TypedPayload for TelegramPayload {
    const KIND: NotificationType = NotificationType::Telegram;

    fn validate(&self) -> Result<(), ValidationError> {
        // Presence and literal syntax are enforced on extraction.
        Ok(())
    }

    fn to_payload(&self) -> Payload {
        let mut payload = Payload::new()
            .with("chat_id", self.chat_id.clone())
            .with("text", self.text.clone());
        if let Some(mode) = self.parse_mode {
            payload.insert("parse_mode", mode.as_str());
        }
        let flags = [
            ("disable_web_page_preview", self.disable_web_page_preview),
            ("disable_notification", self.disable_notification),
            ("protect_content", self.protect_content),
        ];
        for (key, value) in flags {
            if let Some(v) = value {
                payload.insert(key, v.to_string());
            }
        }
        payload
    }
}
