//! Notification persistence.
//!
//! [`NotificationStore`] is the pool-level handle; [`StoreTransaction`] is one
//! open transaction. Claiming (`list_waiting_with_lock`) only holds its row
//! locks for the lifetime of the transaction it runs in, so processing cycles
//! always claim through a transaction.
//!
//! Two implementations exist: [`PgNotificationStore`] on PostgreSQL and
//! [`MemoryNotificationStore`] for tests and local runs. Both follow the same
//! claim, lock and rollback rules.

mod memory;
mod postgres;

pub use memory::{MemoryNotificationStore, MemoryStoreTransaction};
pub use postgres::{PgNotificationStore, PgStoreTransaction};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use herald_common::types::{InvariantViolation, NewNotification, Notification, NotificationStatus};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("notification {0} not found")]
    NotFound(Uuid),

    #[error("notification {id} is {current} and cannot move to {requested}")]
    Terminal {
        id: Uuid,
        current: NotificationStatus,
        requested: NotificationStatus,
    },

    #[error("notification {id} rejected: {source}")]
    Invariant {
        id: Uuid,
        #[source]
        source: InvariantViolation,
    },

    #[error("notification {0} is locked by another transaction")]
    Locked(Uuid),
}

impl StoreError {
    pub(crate) fn check(n: &Notification) -> Result<(), StoreError> {
        n.check_invariants()
            .map_err(|source| StoreError::Invariant { id: n.id, source })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub(crate) fn set_statement(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            IsolationLevel::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

/// Pool-level access. Each call runs in its own implicit transaction.
#[async_trait]
pub trait NotificationStore: Send + Sync + 'static {
    type Tx: StoreTransaction;

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, StoreError>;

    async fn create(&self, new: NewNotification) -> Result<Notification, StoreError>;

    /// Overwrite every mutable column of the row with `n`'s values.
    ///
    /// A terminal row only accepts an update that keeps its status, which is a
    /// no-op returning the stored row.
    async fn update(&self, n: &Notification) -> Result<Notification, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Notification, StoreError>;

    /// Rows eligible for claiming at `now`.
    async fn count_waiting(&self, now: DateTime<Utc>) -> Result<i64, StoreError>;

    async fn list_waiting_with_lock(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, StoreError>;
}

/// One open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait StoreTransaction: Send + Sized + 'static {
    async fn create(&mut self, new: NewNotification) -> Result<Notification, StoreError>;

    async fn update(&mut self, n: &Notification) -> Result<Notification, StoreError>;

    async fn find_by_id(&mut self, id: Uuid) -> Result<Notification, StoreError>;

    async fn count_waiting(&mut self, now: DateTime<Utc>) -> Result<i64, StoreError>;

    /// Claim up to `limit` eligible rows, oldest first, skipping rows another
    /// transaction holds. The claim lasts until commit or rollback.
    async fn list_waiting_with_lock(
        &mut self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// A unit of work run against an open transaction.
pub type TxAction<'a, T, E> =
    Box<dyn for<'t> FnOnce(&'t mut T) -> BoxFuture<'t, Result<(), E>> + Send + 'a>;

/// Box a closure as a [`TxAction`], pinning down its higher-ranked signature.
pub fn tx_action<'a, T, E, F>(f: F) -> TxAction<'a, T, E>
where
    F: for<'t> FnOnce(&'t mut T) -> BoxFuture<'t, Result<(), E>> + Send + 'a,
{
    Box::new(f)
}

/// Run `actions` in order inside one transaction.
///
/// Commits only if every action succeeds. The first failure rolls the whole
/// transaction back and is returned. A panicking action drops the handle while
/// unwinding, which rolls back as well.
pub async fn transaction<S, E>(
    store: &S,
    isolation: IsolationLevel,
    actions: Vec<TxAction<'_, S::Tx, E>>,
) -> Result<(), E>
where
    S: NotificationStore + ?Sized,
    E: From<StoreError> + std::fmt::Display,
{
    let mut tx = store.begin(isolation).await?;

    for action in actions {
        if let Err(e) = action(&mut tx).await {
            tracing::debug!(error = %e, "Transaction action failed, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "Rollback failed");
            }
            return Err(e);
        }
    }

    tx.commit().await?;
    Ok(())
}
