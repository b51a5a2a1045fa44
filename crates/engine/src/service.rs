use std::sync::Arc;

use chrono::{DateTime, Utc};
use herald_common::types::{NewNotification, NotificationStatus, NotificationType, Payload};
use herald_notifier::SenderRegistry;
use uuid::Uuid;

use crate::EngineError;
use crate::clock::Clock;
use crate::store::{NotificationStore, StoreError};

/// Result of a synchronous send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReceipt {
    pub id: Uuid,
    pub sent: bool,
}

/// Entry point for callers that create or inspect notifications.
pub struct NotificationService<S> {
    store: Arc<S>,
    registry: Arc<SenderRegistry>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for NotificationService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: self.registry.clone(),
            clock: self.clock.clone(),
        }
    }
}

fn check_ttl(ttl: i32) -> Result<(), EngineError> {
    if ttl <= 0 {
        return Err(EngineError::InvalidRequest(format!(
            "ttl must be positive, got {ttl}"
        )));
    }
    Ok(())
}

impl<S: NotificationStore> NotificationService<S> {
    pub fn new(store: Arc<S>, registry: Arc<SenderRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            registry,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Store a `pending` notification for the worker to deliver.
    ///
    /// `planned_at` defaults to now. Delivery itself is never attempted here.
    pub async fn enqueue(
        &self,
        kind: NotificationType,
        sender_id: i64,
        payload: Payload,
        ttl: i32,
        planned_at: Option<DateTime<Utc>>,
    ) -> Result<Uuid, EngineError> {
        check_ttl(ttl)?;
        herald_payloads::validate(&payload, kind)?;

        let planned_at = planned_at.unwrap_or_else(|| self.clock.now());
        let n = self
            .store
            .create(NewNotification::pending(kind, sender_id, payload, ttl, planned_at))
            .await
            .map_err(EngineError::Store)?;

        tracing::info!(
            notification_id = %n.id,
            kind = %kind,
            sender_id,
            planned_at = %planned_at,
            "Notification enqueued"
        );
        Ok(n.id)
    }

    /// Deliver right away and record the delivery.
    ///
    /// Nothing is stored when the send fails.
    pub async fn send_immediately(
        &self,
        kind: NotificationType,
        sender_id: i64,
        payload: Payload,
        ttl: i32,
    ) -> Result<SendReceipt, EngineError> {
        check_ttl(ttl)?;
        herald_payloads::validate(&payload, kind)?;

        self.registry.dispatch(kind, &payload).await?;

        let sent_at = self.clock.now();
        let n = self
            .store
            .create(NewNotification::sent(kind, sender_id, payload, ttl, sent_at))
            .await
            .map_err(EngineError::Store)?;

        tracing::info!(notification_id = %n.id, kind = %kind, sender_id, "Notification sent immediately");
        Ok(SendReceipt { id: n.id, sent: true })
    }

    pub async fn check_status(&self, id: Uuid) -> Result<NotificationStatus, EngineError> {
        match self.store.find_by_id(id).await {
            Ok(n) => Ok(n.status),
            Err(StoreError::NotFound(id)) => Err(EngineError::NotFound(id)),
            Err(e) => Err(EngineError::Store(e)),
        }
    }

    /// Notifications due for delivery now.
    pub async fn count_pending(&self) -> Result<i64, EngineError> {
        self.store
            .count_waiting(self.clock.now())
            .await
            .map_err(EngineError::Store)
    }
}
