use herald_common::types::{NotificationType, Payload};

use crate::{TypedPayload, ValidationError, required};

/// A free-form text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainPayload {
    pub message: String,
}

impl PlainPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl TryFrom<&Payload> for PlainPayload {
    type Error = ValidationError;

    fn try_from(payload: &Payload) -> Result<Self, Self::Error> {
        Ok(Self {
            message: required(payload, Self::KIND, "message")?,
        })
    }
}

impl TypedPayload for PlainPayload {
    const KIND: NotificationType = NotificationType::Plain;

    fn validate(&self) -> Result<(), ValidationError> {
        if self.message.is_empty() {
            return Err(ValidationError::MissingField {
                kind: Self::KIND,
                field: "message",
            });
        }
        Ok(())
    }

    fn to_payload(&self) -> Payload {
        Payload::new().with("message", self.message.clone())
    }
}
