use std::sync::LazyLock;

use herald_common::types::{NotificationType, Payload};
use regex::Regex;

use crate::bools::parse_bool;
use crate::{TypedPayload, ValidationError, optional, required};

// `local@domain`, optionally wrapped as `Display Name <local@domain>`.
static ADDRESS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:(?:"[^"]*"|[^"<>@]*?)\s*<(?P<angle>[^<>\s@]+@[^<>\s@]+)>|(?P<bare>[^<>\s@]+@[^<>\s@]+))$"#,
    )
    .unwrap()
});

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*$")
        .unwrap()
});

/// An email message addressed to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailPayload {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
}

/// Return the bare `local@domain` part of `to` if it is a valid address.
pub fn parse_address(to: &str) -> Option<&str> {
    let caps = ADDRESS_REGEX.captures(to.trim())?;
    let addr = caps.name("angle").or_else(|| caps.name("bare"))?.as_str();
    let (local, domain) = addr.rsplit_once('@')?;
    if local.is_empty() || local.starts_with('.') || local.ends_with('.') {
        return None;
    }
    DOMAIN_REGEX.is_match(domain).then_some(addr)
}

impl TryFrom<&Payload> for EmailPayload {
    type Error = ValidationError;

    fn try_from(payload: &Payload) -> Result<Self, Self::Error> {
        let kind = Self::KIND;
        let to = required(payload, kind, "to")?;
        let subject = required(payload, kind, "subject")?;
        let body = required(payload, kind, "body")?;
        let is_html = match optional(payload, "is_html") {
            None => false,
            Some(raw) => parse_bool(raw).ok_or_else(|| {
                ValidationError::invalid(kind, "is_html", format!("'{raw}' is not a boolean"))
            })?,
        };

        Ok(Self {
            to,
            subject,
            body,
            is_html,
        })
    }
}

impl TypedPayload for EmailPayload {
    const KIND: NotificationType = NotificationType::Email;

    fn validate(&self) -> Result<(), ValidationError> {
        if parse_address(&self.to).is_none() {
            return Err(ValidationError::invalid(
                Self::KIND,
                "to",
                format!("email '{}' is invalid", self.to),
            ));
        }
        Ok(())
    }

    fn to_payload(&self) -> Payload {
        Payload::new()
            .with("to", self.to.clone())
            .with("subject", self.subject.clone())
            .with("body", self.body.clone())
            .with("is_html", self.is_html.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_payload(to: &str) -> Payload {
        Payload::new()
            .with("to", to)
            .with("subject", "Weekly report")
            .with("body", "See attached")
    }

    #[test]
    fn test_bare_address() {
        assert_eq!(parse_address("alice@example.com"), Some("alice@example.com"));
    }

    #[test]
    fn test_display_name_address() {
        assert_eq!(
            parse_address("Alice Smith <alice@example.com>"),
            Some("alice@example.com")
        );
        assert_eq!(
            parse_address("\"Smith, Alice\" <alice@example.com>"),
            Some("alice@example.com")
        );
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in [
            "bad-address",
            "@example.com",
            "alice@",
            "alice@@example.com",
            "alice@exa mple.com",
            "Alice <alice@example.com",
            ".alice@example.com",
            "alice@-example.com",
        ] {
            assert_eq!(parse_address(bad), None, "{bad}");
        }
    }

    #[test]
    fn test_parse_defaults_is_html_to_false() {
        let email = EmailPayload::parse(&make_payload("a@b.io")).unwrap();
        assert!(!email.is_html);
    }

    #[test]
    fn test_is_html_literal() {
        let payload = make_payload("a@b.io").with("is_html", "yes");
        assert!(EmailPayload::parse(&payload).unwrap().is_html);

        let payload = make_payload("a@b.io").with("is_html", "sometimes");
        let err = EmailPayload::parse(&payload).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidField {
                field: "is_html",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_subject() {
        let payload = Payload::new().with("to", "a@b.io").with("body", "b");
        assert_eq!(
            EmailPayload::parse(&payload).unwrap_err(),
            ValidationError::MissingField {
                kind: NotificationType::Email,
                field: "subject"
            }
        );
    }

    #[test]
    fn test_bad_address_rejected_by_validate() {
        let err = EmailPayload::parse(&make_payload("bad-address")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "payload email has invalid field 'to': email 'bad-address' is invalid"
        );
    }
}
