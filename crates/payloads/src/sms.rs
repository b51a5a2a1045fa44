use herald_common::types::{NotificationType, Payload};

use crate::bools::parse_bool;
use crate::{TypedPayload, ValidationError, optional, required};

/// Hard cap on the text size, in bytes, whatever the split setting.
pub const MESSAGE_BYTE_LIMIT: usize = 2000;

/// Characters in a single GSM-7 encoded SMS.
pub const LIMIT_GSM7: usize = 160;

/// Characters in a single UCS-2 encoded SMS.
pub const LIMIT_UCS2: usize = 70;

const PHONE_LEN: usize = 11;
const PHONE_PREFIX: &str = "79";

/// GSM 03.38 basic character set.
const GSM7_CHARSET: &str = concat!(
    "@£$¥èéùìòÇ\nØø\rÅå",
    "Δ_ΦΓΛΩΠΨΣΘΞ\x1bÆæßÉ",
    " !\"#¤%&'()*+,-./",
    "0123456789:;<=>?",
    "¡ABCDEFGHIJKLMNO",
    "PQRSTUVWXYZÄÖÑÜ§",
    "¿abcdefghijklmno",
    "pqrstuvwxyzäöñüà",
);

/// Whether every character of `text` exists in the GSM-7 basic set.
pub fn is_gsm7_compatible(text: &str) -> bool {
    text.chars().all(|c| GSM7_CHARSET.contains(c))
}

/// Whether `text` needs more than one SMS segment.
pub fn exceeds_single_sms(text: &str) -> bool {
    let chars = text.chars().count();
    if is_gsm7_compatible(text) {
        chars > LIMIT_GSM7
    } else {
        chars > LIMIT_UCS2
    }
}

/// A text message to a Russian mobile number (`79XXXXXXXXX`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsPayload {
    pub phone: String,
    pub text: String,
    /// Allow the gateway to split long text over several segments.
    pub split: bool,
}

impl TryFrom<&Payload> for SmsPayload {
    type Error = ValidationError;

    fn try_from(payload: &Payload) -> Result<Self, Self::Error> {
        let kind = Self::KIND;
        let text = required(payload, kind, "text")?;
        let phone = required(payload, kind, "phone")?;
        let split = match optional(payload, "split") {
            None => false,
            Some(raw) => parse_bool(raw).ok_or_else(|| {
                ValidationError::invalid(kind, "split", format!("'{raw}' is not a boolean"))
            })?,
        };

        Ok(Self { phone, text, split })
    }
}

impl TypedPayload for SmsPayload {
    const KIND: NotificationType = NotificationType::Sms;

    fn validate(&self) -> Result<(), ValidationError> {
        let kind = Self::KIND;

        if self.text.len() > MESSAGE_BYTE_LIMIT {
            return Err(ValidationError::invalid(
                kind,
                "text",
                format!("message exceeds limit of {MESSAGE_BYTE_LIMIT} bytes"),
            ));
        }

        if self.phone.chars().count() != PHONE_LEN
            || !self.phone.starts_with(PHONE_PREFIX)
            || !self.phone.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ValidationError::invalid(
                kind,
                "phone",
                "phone must be in format 79009009090",
            ));
        }

        if !self.split && exceeds_single_sms(&self.text) {
            return Err(ValidationError::invalid(
                kind,
                "text",
                r#"message exceeds single SMS limit, add {"split":"true"} to send several segments"#,
            ));
        }

        Ok(())
    }

    fn to_payload(&self) -> Payload {
        Payload::new()
            .with("phone", self.phone.clone())
            .with("text", self.text.clone())
            .with("split", self.split.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_payload(text: &str) -> Payload {
        Payload::new().with("phone", "79009009090").with("text", text)
    }

    #[test]
    fn test_gsm7_detection() {
        assert!(is_gsm7_compatible("Hello, world! 123 @£$"));
        assert!(is_gsm7_compatible("ÄÖÑÜ§ äöñüà"));
        assert!(!is_gsm7_compatible("Привет"));
        assert!(!is_gsm7_compatible("emoji 🙂"));
    }

    #[test]
    fn test_gsm7_limit_boundary() {
        assert!(!exceeds_single_sms(&"a".repeat(LIMIT_GSM7)));
        assert!(exceeds_single_sms(&"a".repeat(LIMIT_GSM7 + 1)));
    }

    #[test]
    fn test_ucs2_limit_boundary() {
        assert!(!exceeds_single_sms(&"ж".repeat(LIMIT_UCS2)));
        assert!(exceeds_single_sms(&"ж".repeat(LIMIT_UCS2 + 1)));
    }

    #[test]
    fn test_valid_sms() {
        let sms = SmsPayload::parse(&make_payload("Your code is 1234")).unwrap();
        assert_eq!(sms.phone, "79009009090");
        assert!(!sms.split);
    }

    #[test]
    fn test_phone_format() {
        for phone in ["7900900909", "89009009090", "790090090901", "79OO9009090"] {
            let payload = Payload::new().with("phone", phone).with("text", "hi");
            let err = SmsPayload::parse(&payload).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidField { field: "phone", .. }),
                "{phone}"
            );
        }
    }

    #[test]
    fn test_long_text_requires_split() {
        let long = "ж".repeat(100);
        assert!(SmsPayload::parse(&make_payload(&long)).is_err());

        let payload = make_payload(&long).with("split", "true");
        assert!(SmsPayload::parse(&payload).unwrap().split);
    }

    #[test]
    fn test_byte_limit_applies_even_when_split() {
        let payload = make_payload(&"a".repeat(MESSAGE_BYTE_LIMIT + 1)).with("split", "1");
        let err = SmsPayload::parse(&payload).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "text", .. }));
    }

    #[test]
    fn test_split_must_be_boolean() {
        let payload = make_payload("hi").with("split", "sure");
        let err = SmsPayload::parse(&payload).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "split", .. }));
    }
}
