//! Per-channel payload shapes and validation.
//!
//! A notification's payload is a flat string map. Each channel that can
//! actually deliver has a typed shape here; extraction (`TryFrom<&Payload>`)
//! checks presence and literal syntax, `validate()` checks the semantic rules.

pub mod bools;
pub mod email;
pub mod plain;
pub mod sms;
pub mod telegram;

use herald_common::types::{NotificationType, Payload};
use thiserror::Error;

pub use email::EmailPayload;
pub use plain::PlainPayload;
pub use sms::SmsPayload;
pub use telegram::{ParseMode, TelegramPayload};

/// Why a payload was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("notification type '{0}' is not implemented")]
    Unsupported(NotificationType),

    #[error("payload {kind} has empty field '{field}'")]
    MissingField {
        kind: NotificationType,
        field: &'static str,
    },

    #[error("payload {kind} has invalid field '{field}': {reason}")]
    InvalidField {
        kind: NotificationType,
        field: &'static str,
        reason: String,
    },
}

impl ValidationError {
    /// The type has no payload shape at all, as opposed to a malformed payload.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ValidationError::Unsupported(_))
    }

    pub(crate) fn invalid(
        kind: NotificationType,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        ValidationError::InvalidField {
            kind,
            field,
            reason: reason.into(),
        }
    }
}

/// A typed view of a [`Payload`] for one channel.
pub trait TypedPayload: Sized + for<'a> TryFrom<&'a Payload, Error = ValidationError> {
    /// Channel this shape belongs to.
    const KIND: NotificationType;

    /// Semantic checks beyond field presence.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Flatten back into the stored representation.
    fn to_payload(&self) -> Payload;

    /// Extract and validate in one step.
    fn parse(payload: &Payload) -> Result<Self, ValidationError> {
        let typed = Self::try_from(payload)?;
        typed.validate()?;
        Ok(typed)
    }
}

/// Validate `payload` against the shape required by `kind`.
pub fn validate(payload: &Payload, kind: NotificationType) -> Result<(), ValidationError> {
    let result = match kind {
        NotificationType::Plain => PlainPayload::parse(payload).map(drop),
        NotificationType::Email => EmailPayload::parse(payload).map(drop),
        NotificationType::Telegram => TelegramPayload::parse(payload).map(drop),
        NotificationType::Sms => SmsPayload::parse(payload).map(drop),
        NotificationType::Push | NotificationType::Whatsapp => {
            Err(ValidationError::Unsupported(kind))
        }
    };

    if let Err(ref e) = result {
        tracing::debug!(kind = %kind, error = %e, "Payload rejected");
    }
    result
}

/// Required field: present and non-empty.
pub(crate) fn required(
    payload: &Payload,
    kind: NotificationType,
    field: &'static str,
) -> Result<String, ValidationError> {
    match payload.get(field) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(ValidationError::MissingField { kind, field }),
    }
}

/// Optional field: absent and empty are the same thing.
pub(crate) fn optional<'a>(payload: &'a Payload, field: &str) -> Option<&'a str> {
    payload.get(field).filter(|v| !v.is_empty())
}
