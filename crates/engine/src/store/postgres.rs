use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_common::types::{NewNotification, Notification, NotificationType};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{IsolationLevel, NotificationStore, StoreError, StoreTransaction};

/// PostgreSQL-backed notification store.
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
    channels: Arc<Vec<String>>,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            channels: Arc::new(
                NotificationType::ALL
                    .iter()
                    .map(|t| t.as_str().to_string())
                    .collect(),
            ),
        }
    }

    /// Only claim and count rows of these types.
    pub fn with_channels(mut self, channels: impl IntoIterator<Item = NotificationType>) -> Self {
        self.channels = Arc::new(
            channels
                .into_iter()
                .map(|t| t.as_str().to_string())
                .collect(),
        );
        self
    }
}

async fn insert(conn: &mut PgConnection, new: NewNotification) -> Result<Notification, StoreError> {
    let draft = new.into_notification(Uuid::new_v4(), Utc::now());
    StoreError::check(&draft)?;

    let row = sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications
            (id, sender_id, type, payload, ttl, status, planned_at, retry_at, retries, sent_at,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, 0, $8, clock_timestamp(), clock_timestamp())
        RETURNING *
        "#,
    )
    .bind(draft.id)
    .bind(draft.sender_id)
    .bind(draft.kind)
    .bind(Json(&draft.payload))
    .bind(draft.ttl)
    .bind(draft.status)
    .bind(draft.planned_at)
    .bind(draft.sent_at)
    .fetch_one(conn)
    .await?;

    Ok(row)
}

async fn update(conn: &mut PgConnection, n: &Notification) -> Result<Notification, StoreError> {
    StoreError::check(n)?;

    // Terminal rows are never rewritten.
    let updated = sqlx::query_as::<_, Notification>(
        r#"
        UPDATE notifications
        SET sender_id = $2,
            type = $3,
            payload = $4,
            ttl = $5,
            status = $6,
            planned_at = $7,
            retry_at = $8,
            retries = $9,
            sent_at = $10,
            updated_at = clock_timestamp()
        WHERE id = $1 AND status NOT IN ('sent', 'fail')
        RETURNING *
        "#,
    )
    .bind(n.id)
    .bind(n.sender_id)
    .bind(n.kind)
    .bind(Json(&n.payload))
    .bind(n.ttl)
    .bind(n.status)
    .bind(n.planned_at)
    .bind(n.retry_at)
    .bind(n.retries)
    .bind(n.sent_at)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = updated {
        return Ok(row);
    }

    let current = find(conn, n.id).await?;
    if current.status == n.status {
        return Ok(current);
    }
    Err(StoreError::Terminal {
        id: n.id,
        current: current.status,
        requested: n.status,
    })
}

async fn find(conn: &mut PgConnection, id: Uuid) -> Result<Notification, StoreError> {
    sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(StoreError::NotFound(id))
}

async fn count_waiting(
    conn: &mut PgConnection,
    channels: &[String],
    now: DateTime<Utc>,
) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM notifications
        WHERE status IN ('pending', 'retry')
          AND type = ANY($1)
          AND ((retry_at IS NULL AND planned_at <= $2) OR retry_at <= $2)
        "#,
    )
    .bind(channels)
    .bind(now)
    .fetch_one(conn)
    .await?;

    Ok(count)
}

async fn list_waiting_with_lock(
    conn: &mut PgConnection,
    channels: &[String],
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Notification>, StoreError> {
    let rows = sqlx::query_as::<_, Notification>(
        r#"
        SELECT * FROM notifications
        WHERE status IN ('pending', 'retry')
          AND type = ANY($1)
          AND ((retry_at IS NULL AND planned_at <= $2) OR retry_at <= $2)
        ORDER BY created_at ASC
        LIMIT $3
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(channels)
    .bind(now)
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(conn)
    .await?;

    Ok(rows)
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    type Tx = PgStoreTransaction;

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(isolation.set_statement())
            .execute(&mut *tx)
            .await?;
        Ok(PgStoreTransaction {
            tx,
            channels: self.channels.clone(),
        })
    }

    async fn create(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let n = insert(&mut conn, new).await?;
        tracing::debug!(notification_id = %n.id, status = %n.status, "Notification stored");
        Ok(n)
    }

    async fn update(&self, n: &Notification) -> Result<Notification, StoreError> {
        let mut conn = self.pool.acquire().await?;
        update(&mut conn, n).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Notification, StoreError> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, id).await
    }

    async fn count_waiting(&self, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        count_waiting(&mut conn, &self.channels, now).await
    }

    async fn list_waiting_with_lock(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        list_waiting_with_lock(&mut conn, &self.channels, limit, now).await
    }
}

/// An open PostgreSQL transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
    channels: Arc<Vec<String>>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn create(&mut self, new: NewNotification) -> Result<Notification, StoreError> {
        insert(&mut self.tx, new).await
    }

    async fn update(&mut self, n: &Notification) -> Result<Notification, StoreError> {
        update(&mut self.tx, n).await
    }

    async fn find_by_id(&mut self, id: Uuid) -> Result<Notification, StoreError> {
        find(&mut self.tx, id).await
    }

    async fn count_waiting(&mut self, now: DateTime<Utc>) -> Result<i64, StoreError> {
        count_waiting(&mut self.tx, &self.channels, now).await
    }

    async fn list_waiting_with_lock(
        &mut self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, StoreError> {
        list_waiting_with_lock(&mut self.tx, &self.channels, limit, now).await
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
