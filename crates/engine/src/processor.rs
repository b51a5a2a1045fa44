//! Processing cycle.
//!
//! One cycle is one read-committed transaction:
//! 1. Claim up to `limit` due notifications (`FOR UPDATE SKIP LOCKED`)
//! 2. Dispatch each through the sender registry, which re-validates the payload
//! 3. Feed the outcome into the retry/backoff state machine
//! 4. Persist the transition inside the same transaction
//!
//! A failed persist aborts the cycle and rolls back every transition in it, so
//! the claimed rows become claimable again. Sends already made are not undone.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use herald_common::types::NotificationStatus;
use herald_notifier::SenderRegistry;
use thiserror::Error;

use crate::EngineError;
use crate::backoff::{self, Outcome, RetryPolicy, RetryState};
use crate::clock::Clock;
use crate::store::{IsolationLevel, NotificationStore, StoreTransaction, transaction, tx_action};

/// Shared, read-only inputs of every cycle.
pub struct CycleContext {
    pub registry: Arc<SenderRegistry>,
    pub clock: Arc<dyn Clock>,
    pub policy: RetryPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Rows claimed.
    pub found: usize,
    /// Rows that reached `sent`.
    pub processed: usize,
}

/// A cycle that rolled back. Nothing it did was persisted.
#[derive(Debug, Error)]
#[error("processing cycle failed after claiming {found} notifications: {error}")]
pub struct CycleFailure {
    pub found: usize,
    #[source]
    pub error: EngineError,
}

#[derive(Debug, Default)]
struct CycleCounters {
    found: AtomicUsize,
    processed: AtomicUsize,
}

pub struct Processor<S> {
    store: Arc<S>,
    ctx: Arc<CycleContext>,
}

impl<S> Clone for Processor<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<S: NotificationStore> Processor<S> {
    pub fn new(store: Arc<S>, ctx: CycleContext) -> Self {
        Self {
            store,
            ctx: Arc::new(ctx),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn context(&self) -> &CycleContext {
        &self.ctx
    }

    /// Run one processing cycle over at most `limit` notifications.
    pub async fn process(&self, limit: usize) -> Result<CycleReport, CycleFailure> {
        let counters = Arc::new(CycleCounters::default());
        let ctx = self.ctx.clone();
        let batch_counters = counters.clone();

        let result = transaction(
            self.store.as_ref(),
            IsolationLevel::ReadCommitted,
            vec![tx_action(move |tx: &mut S::Tx| {
                Box::pin(drain_batch(tx, ctx, limit, batch_counters))
            })],
        )
        .await;

        let found = counters.found.load(Ordering::SeqCst);
        match result {
            Ok(()) => Ok(CycleReport {
                found,
                processed: counters.processed.load(Ordering::SeqCst),
            }),
            Err(error) => Err(CycleFailure { found, error }),
        }
    }
}

async fn drain_batch<T: StoreTransaction>(
    tx: &mut T,
    ctx: Arc<CycleContext>,
    limit: usize,
    counters: Arc<CycleCounters>,
) -> Result<(), EngineError> {
    let batch = tx
        .list_waiting_with_lock(limit, ctx.clock.now())
        .await
        .map_err(EngineError::Claim)?;
    counters.found.store(batch.len(), Ordering::SeqCst);

    let mut processed = 0;
    for mut n in batch {
        let outcome = match ctx.registry.dispatch(n.kind, &n.payload).await {
            Ok(()) => Outcome::Success,
            Err(e) => {
                tracing::warn!(
                    notification_id = %n.id,
                    kind = %n.kind,
                    retries = n.retries,
                    error = %e,
                    "Delivery attempt failed"
                );
                Outcome::Failure
            }
        };

        let next = backoff::transition(&ctx.policy, &RetryState::from(&n), outcome, ctx.clock.now());
        next.apply(&mut n);

        tx.update(&n).await.map_err(EngineError::Persistence)?;

        match n.status {
            NotificationStatus::Sent => {
                processed += 1;
                tracing::debug!(notification_id = %n.id, kind = %n.kind, "Notification sent");
            }
            NotificationStatus::Retry => {
                tracing::debug!(
                    notification_id = %n.id,
                    retries = n.retries,
                    retry_at = ?n.retry_at,
                    "Notification scheduled for retry"
                );
            }
            NotificationStatus::Fail => {
                tracing::info!(
                    notification_id = %n.id,
                    kind = %n.kind,
                    retries = n.retries,
                    ttl = n.ttl,
                    "Notification failed permanently"
                );
            }
            NotificationStatus::Draft | NotificationStatus::Pending => {}
        }
    }

    counters.processed.store(processed, Ordering::SeqCst);
    Ok(())
}
