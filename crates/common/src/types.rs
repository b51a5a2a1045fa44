use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Delivery channel a notification is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum NotificationType {
    Plain,
    Email,
    Sms,
    Push,
    Whatsapp,
    Telegram,
}

impl NotificationType {
    pub const ALL: [NotificationType; 6] = [
        NotificationType::Plain,
        NotificationType::Email,
        NotificationType::Sms,
        NotificationType::Push,
        NotificationType::Whatsapp,
        NotificationType::Telegram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Plain => "plain",
            NotificationType::Email => "email",
            NotificationType::Sms => "sms",
            NotificationType::Push => "push",
            NotificationType::Whatsapp => "whatsapp",
            NotificationType::Telegram => "telegram",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown notification type: {s}"))
    }
}

/// Lifecycle status of a notification.
///
/// `Sent` and `Fail` are terminal: once reached, the row is never claimed or
/// mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum NotificationStatus {
    Draft,
    Pending,
    Sent,
    Retry,
    Fail,
}

impl NotificationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NotificationStatus::Sent | NotificationStatus::Fail)
    }

    /// Statuses the worker pool picks up.
    pub fn is_waiting(&self) -> bool {
        matches!(self, NotificationStatus::Pending | NotificationStatus::Retry)
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Draft => write!(f, "draft"),
            NotificationStatus::Pending => write!(f, "pending"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Retry => write!(f, "retry"),
            NotificationStatus::Fail => write!(f, "fail"),
        }
    }
}

/// Channel-specific key/value payload, stored as JSONB.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(pub BTreeMap<String, String>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert, handy for literals in tests and seeding.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A row violates the status/timestamp coupling rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("sent_at must be set if and only if status is sent (status = {0})")]
    SentAt(NotificationStatus),

    #[error("retry_at may only be set while status is retry (status = {0})")]
    RetryAt(NotificationStatus),
}

/// A notification: the unit of work of the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub sender_id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: NotificationType,
    #[sqlx(json)]
    pub payload: Payload,
    /// Seconds the system may keep retrying, measured from `planned_at`.
    pub ttl: i32,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub planned_at: DateTime<Utc>,
    pub retry_at: Option<DateTime<Utc>>,
    pub retries: i32,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.sent_at.is_some() != (self.status == NotificationStatus::Sent) {
            return Err(InvariantViolation::SentAt(self.status));
        }
        if self.retry_at.is_some() && self.status != NotificationStatus::Retry {
            return Err(InvariantViolation::RetryAt(self.status));
        }
        Ok(())
    }

    /// Whether the row is eligible for claiming at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.status.is_waiting() {
            return false;
        }
        match self.retry_at {
            Some(retry_at) => retry_at <= now,
            None => self.planned_at <= now,
        }
    }
}

/// Fields supplied when inserting a notification. Timestamps the store owns
/// (`created_at`, `updated_at`) and `id` are assigned on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub sender_id: i64,
    pub kind: NotificationType,
    pub payload: Payload,
    pub ttl: i32,
    pub status: NotificationStatus,
    pub planned_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl NewNotification {
    /// A `pending` notification eligible from `planned_at`.
    pub fn pending(
        kind: NotificationType,
        sender_id: i64,
        payload: Payload,
        ttl: i32,
        planned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sender_id,
            kind,
            payload,
            ttl,
            status: NotificationStatus::Pending,
            planned_at,
            sent_at: None,
        }
    }

    /// A notification already delivered at `sent_at`.
    pub fn sent(
        kind: NotificationType,
        sender_id: i64,
        payload: Payload,
        ttl: i32,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sender_id,
            kind,
            payload,
            ttl,
            status: NotificationStatus::Sent,
            planned_at: sent_at,
            sent_at: Some(sent_at),
        }
    }

    /// Materialise the row as it will be stored.
    pub fn into_notification(self, id: Uuid, now: DateTime<Utc>) -> Notification {
        Notification {
            id,
            sender_id: self.sender_id,
            kind: self.kind,
            payload: self.payload,
            ttl: self.ttl,
            status: self.status,
            created_at: now,
            updated_at: now,
            planned_at: self.planned_at,
            retry_at: None,
            retries: 0,
            sent_at: self.sent_at,
        }
    }
}
