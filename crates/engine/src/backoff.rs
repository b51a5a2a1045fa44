//! Retry/backoff state machine.
//!
//! Decides what happens to a notification after a delivery attempt. Failed
//! attempts are retried after a fixed interval until the next retry would land
//! more than `ttl` seconds after `planned_at`; then the notification fails for
//! good. The deadline is checked against the scheduled retry time, not against
//! the time of the failed attempt.

use chrono::{DateTime, Duration, Utc};
use herald_common::config::AppConfig;
use herald_common::types::{Notification, NotificationStatus};

/// Default delay between a failed attempt and the next one.
pub const DEFAULT_RETRY_INTERVAL_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let secs = i64::try_from(config.retry_interval_secs).unwrap_or(DEFAULT_RETRY_INTERVAL_SECS);
        Self::new(Duration::seconds(secs))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_RETRY_INTERVAL_SECS))
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// The fields of a notification the state machine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub status: NotificationStatus,
    pub retries: i32,
    pub planned_at: DateTime<Utc>,
    pub retry_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub ttl: i32,
}

impl From<&Notification> for RetryState {
    fn from(n: &Notification) -> Self {
        Self {
            status: n.status,
            retries: n.retries,
            planned_at: n.planned_at,
            retry_at: n.retry_at,
            sent_at: n.sent_at,
            ttl: n.ttl,
        }
    }
}

/// The fields of a notification the state machine writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: NotificationStatus,
    pub retries: i32,
    pub retry_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Transition {
    pub fn apply(&self, n: &mut Notification) {
        n.status = self.status;
        n.retries = self.retries;
        n.retry_at = self.retry_at;
        n.sent_at = self.sent_at;
    }
}

pub fn transition(
    policy: &RetryPolicy,
    state: &RetryState,
    outcome: Outcome,
    now: DateTime<Utc>,
) -> Transition {
    if state.status.is_terminal() {
        return Transition {
            status: state.status,
            retries: state.retries,
            retry_at: state.retry_at,
            sent_at: state.sent_at,
        };
    }

    match outcome {
        Outcome::Success => Transition {
            status: NotificationStatus::Sent,
            retries: state.retries,
            retry_at: None,
            sent_at: Some(now),
        },
        Outcome::Failure => {
            let retries = state.retries.saturating_add(1);
            let next_retry_at = now + policy.interval;
            let live = next_retry_at - state.planned_at;

            if live > Duration::seconds(i64::from(state.ttl)) {
                Transition {
                    status: NotificationStatus::Fail,
                    retries,
                    retry_at: None,
                    sent_at: None,
                }
            } else {
                Transition {
                    status: NotificationStatus::Retry,
                    retries,
                    retry_at: Some(next_retry_at),
                    sent_at: None,
                }
            }
        }
    }
}
