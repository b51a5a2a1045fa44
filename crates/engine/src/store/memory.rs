use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_common::types::{NewNotification, Notification, NotificationType};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{IsolationLevel, NotificationStore, StoreError, StoreTransaction};
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Default)]
struct State {
    /// Committed rows in insertion order; ties on `created_at` keep this order.
    rows: Vec<Notification>,
    index: HashMap<Uuid, usize>,
    /// Row id -> id of the transaction holding its lock.
    locks: HashMap<Uuid, u64>,
    next_tx: u64,
}

impl State {
    fn get(&self, id: Uuid) -> Option<&Notification> {
        self.index.get(&id).map(|&i| &self.rows[i])
    }

    fn insert(&mut self, n: Notification) {
        self.index.insert(n.id, self.rows.len());
        self.rows.push(n);
    }

    fn replace(&mut self, n: Notification) {
        if let Some(&i) = self.index.get(&n.id) {
            self.rows[i] = n;
        }
    }

    fn locked_by_other(&self, id: Uuid, tx: Option<u64>) -> bool {
        match self.locks.get(&id) {
            Some(owner) => Some(*owner) != tx,
            None => false,
        }
    }

    fn release(&mut self, tx: u64) {
        self.locks.retain(|_, owner| *owner != tx);
    }
}

/// In-process store with the same claim, lock and rollback rules as the
/// PostgreSQL store.
///
/// Writes made inside a transaction stay private to it until commit. Row locks
/// are taken by `list_waiting_with_lock` and `update` and released on commit,
/// rollback or drop. A pool-level `update` of a row locked by an open
/// transaction fails with [`StoreError::Locked`] instead of blocking.
#[derive(Clone)]
pub struct MemoryNotificationStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
    channels: Arc<Vec<NotificationType>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
            channels: Arc::new(NotificationType::ALL.to_vec()),
        }
    }

    /// Only claim and count rows of these types.
    pub fn with_channels(mut self, channels: impl IntoIterator<Item = NotificationType>) -> Self {
        self.channels = Arc::new(channels.into_iter().collect());
        self
    }

    /// Every committed row, in insertion order.
    pub fn all(&self) -> Vec<Notification> {
        self.state.lock().rows.clone()
    }

    fn waiting<'a>(
        &self,
        rows: impl Iterator<Item = &'a Notification>,
        now: DateTime<Utc>,
    ) -> Vec<&'a Notification> {
        let mut due: Vec<&Notification> = rows
            .filter(|n| self.channels.contains(&n.kind) && n.is_due(now))
            .collect();
        // Stable sort keeps insertion order between equal timestamps.
        due.sort_by_key(|n| n.created_at);
        due
    }
}

impl Default for MemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply an update to `current`, enforcing terminal stability and invariants.
/// `Ok(None)` means an idempotent no-op on a terminal row.
fn prepare_update(
    current: &Notification,
    n: &Notification,
    now: DateTime<Utc>,
) -> Result<Option<Notification>, StoreError> {
    if current.status.is_terminal() {
        if current.status == n.status {
            return Ok(None);
        }
        return Err(StoreError::Terminal {
            id: n.id,
            current: current.status,
            requested: n.status,
        });
    }
    StoreError::check(n)?;

    let mut updated = n.clone();
    updated.created_at = current.created_at;
    updated.updated_at = now;
    Ok(Some(updated))
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    type Tx = MemoryStoreTransaction;

    async fn begin(&self, _isolation: IsolationLevel) -> Result<Self::Tx, StoreError> {
        let id = {
            let mut state = self.state.lock();
            state.next_tx += 1;
            state.next_tx
        };
        Ok(MemoryStoreTransaction {
            id,
            store: self.clone(),
            created: Vec::new(),
            updated: HashMap::new(),
            finished: false,
        })
    }

    async fn create(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let n = new.into_notification(Uuid::new_v4(), self.clock.now());
        StoreError::check(&n)?;
        self.state.lock().insert(n.clone());
        Ok(n)
    }

    async fn update(&self, n: &Notification) -> Result<Notification, StoreError> {
        let mut state = self.state.lock();
        let current = state.get(n.id).ok_or(StoreError::NotFound(n.id))?;
        if state.locked_by_other(n.id, None) {
            return Err(StoreError::Locked(n.id));
        }
        match prepare_update(current, n, self.clock.now())? {
            Some(updated) => {
                state.replace(updated.clone());
                Ok(updated)
            }
            None => Ok(current.clone()),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Notification, StoreError> {
        self.state
            .lock()
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn count_waiting(&self, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let state = self.state.lock();
        Ok(self.waiting(state.rows.iter(), now).len() as i64)
    }

    async fn list_waiting_with_lock(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, StoreError> {
        // Autocommit: the lock would be released immediately, so only skip.
        let state = self.state.lock();
        Ok(self
            .waiting(state.rows.iter(), now)
            .into_iter()
            .filter(|n| !state.locked_by_other(n.id, None))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Transaction handle for [`MemoryNotificationStore`].
pub struct MemoryStoreTransaction {
    id: u64,
    store: MemoryNotificationStore,
    created: Vec<Notification>,
    updated: HashMap<Uuid, Notification>,
    finished: bool,
}

impl MemoryStoreTransaction {
    /// The row as this transaction sees it: own writes first, then committed state.
    fn visible(&self, state: &State, id: Uuid) -> Option<Notification> {
        self.updated
            .get(&id)
            .or_else(|| self.created.iter().find(|n| n.id == id))
            .or_else(|| state.get(id))
            .cloned()
    }

    fn snapshot(&self, state: &State) -> Vec<Notification> {
        state
            .rows
            .iter()
            .map(|n| self.updated.get(&n.id).unwrap_or(n))
            .chain(self.created.iter())
            .cloned()
            .collect()
    }

    fn finish(&mut self, apply: bool) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut state = self.store.state.lock();
        if apply {
            for n in self.created.drain(..) {
                state.insert(n);
            }
            for (_, n) in self.updated.drain() {
                state.replace(n);
            }
        }
        state.release(self.id);
    }
}

#[async_trait]
impl StoreTransaction for MemoryStoreTransaction {
    async fn create(&mut self, new: NewNotification) -> Result<Notification, StoreError> {
        let n = new.into_notification(Uuid::new_v4(), self.store.clock.now());
        StoreError::check(&n)?;
        self.created.push(n.clone());
        Ok(n)
    }

    async fn update(&mut self, n: &Notification) -> Result<Notification, StoreError> {
        let now = self.store.clock.now();
        let mut state = self.store.state.lock();
        let current = self.visible(&state, n.id).ok_or(StoreError::NotFound(n.id))?;
        if state.locked_by_other(n.id, Some(self.id)) {
            return Err(StoreError::Locked(n.id));
        }

        let Some(updated) = prepare_update(&current, n, now)? else {
            return Ok(current);
        };

        if let Some(staged) = self.created.iter_mut().find(|c| c.id == n.id) {
            *staged = updated.clone();
        } else {
            state.locks.insert(n.id, self.id);
            self.updated.insert(n.id, updated.clone());
        }
        Ok(updated)
    }

    async fn find_by_id(&mut self, id: Uuid) -> Result<Notification, StoreError> {
        let state = self.store.state.lock();
        self.visible(&state, id).ok_or(StoreError::NotFound(id))
    }

    async fn count_waiting(&mut self, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let state = self.store.state.lock();
        let rows = self.snapshot(&state);
        Ok(self.store.waiting(rows.iter(), now).len() as i64)
    }

    async fn list_waiting_with_lock(
        &mut self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut state = self.store.state.lock();
        let rows = self.snapshot(&state);
        let claimed: Vec<Notification> = self
            .store
            .waiting(rows.iter(), now)
            .into_iter()
            .filter(|n| !state.locked_by_other(n.id, Some(self.id)))
            .take(limit)
            .cloned()
            .collect();

        for n in &claimed {
            state.locks.insert(n.id, self.id);
        }
        Ok(claimed)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.finish(true);
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.finish(false);
        Ok(())
    }
}

impl Drop for MemoryStoreTransaction {
    fn drop(&mut self) {
        self.finish(false);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use herald_common::types::{NotificationStatus, Payload};

    use super::*;
    use crate::clock::ManualClock;

    fn make_new(kind: NotificationType, planned_at: DateTime<Utc>) -> NewNotification {
        NewNotification::pending(
            kind,
            1,
            Payload::new().with("message", "hello"),
            40,
            planned_at,
        )
    }

    async fn seed(store: &MemoryNotificationStore, count: usize) -> Vec<Notification> {
        let mut rows = Vec::new();
        for _ in 0..count {
            rows.push(
                store
                    .create(make_new(NotificationType::Plain, Utc::now() - chrono::Duration::seconds(1)))
                    .await
                    .unwrap(),
            );
        }
        rows
    }

    #[tokio::test]
    async fn test_claims_are_disjoint() {
        let store = MemoryNotificationStore::new();
        seed(&store, 50).await;

        let mut txs = Vec::new();
        let mut seen = HashSet::new();
        for _ in 0..4 {
            let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
            let claimed = tx.list_waiting_with_lock(10, Utc::now()).await.unwrap();
            assert_eq!(claimed.len(), 10);
            for n in &claimed {
                assert!(seen.insert(n.id), "row {} claimed twice", n.id);
            }
            txs.push(tx);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_claims_from_concurrent_tasks_are_disjoint() {
        const TASKS: usize = 8;
        const LIMIT: usize = 5;
        let store = MemoryNotificationStore::new();
        seed(&store, 50).await;

        // Every task keeps its claim open until all of them have claimed.
        let barrier = Arc::new(tokio::sync::Barrier::new(TASKS));
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..TASKS {
            let store = store.clone();
            let barrier = barrier.clone();
            tasks.spawn(async move {
                let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
                let claimed = tx.list_waiting_with_lock(LIMIT, Utc::now()).await.unwrap();
                barrier.wait().await;
                claimed.into_iter().map(|n| n.id).collect::<Vec<_>>()
            });
        }

        let mut seen = HashSet::new();
        while let Some(claimed) = tasks.join_next().await {
            let claimed = claimed.unwrap();
            assert_eq!(claimed.len(), LIMIT);
            for id in claimed {
                assert!(seen.insert(id), "row {id} claimed twice");
            }
        }
        assert_eq!(seen.len(), TASKS * LIMIT);
    }

    #[tokio::test]
    async fn test_claims_fifo_by_creation() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryNotificationStore::with_clock(clock.clone());
        let mut ids = Vec::new();
        for _ in 0..3 {
            let n = store
                .create(make_new(NotificationType::Plain, clock.now()))
                .await
                .unwrap();
            ids.push(n.id);
            clock.advance(chrono::Duration::seconds(1));
        }

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let claimed: Vec<Uuid> = tx
            .list_waiting_with_lock(10, clock.now())
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(claimed, ids);
    }

    #[tokio::test]
    async fn test_future_and_retry_windows() {
        let store = MemoryNotificationStore::new();
        let now = Utc::now();
        store
            .create(make_new(NotificationType::Plain, now + chrono::Duration::seconds(30)))
            .await
            .unwrap();
        let mut waiting = store.create(make_new(NotificationType::Plain, now)).await.unwrap();

        assert_eq!(store.count_waiting(now).await.unwrap(), 1);

        waiting.status = NotificationStatus::Retry;
        waiting.retries = 1;
        waiting.retry_at = Some(now + chrono::Duration::seconds(5));
        store.update(&waiting).await.unwrap();

        assert_eq!(store.count_waiting(now).await.unwrap(), 0);
        assert_eq!(
            store
                .count_waiting(now + chrono::Duration::seconds(5))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_channel_filter() {
        let store = MemoryNotificationStore::new().with_channels([NotificationType::Plain]);
        let now = Utc::now();
        store.create(make_new(NotificationType::Plain, now)).await.unwrap();
        store.create(make_new(NotificationType::Sms, now)).await.unwrap();

        assert_eq!(store.count_waiting(now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_terminal_rows_never_claimed() {
        let store = MemoryNotificationStore::new();
        let now = Utc::now();
        let mut sent = store.create(make_new(NotificationType::Plain, now)).await.unwrap();
        sent.status = NotificationStatus::Sent;
        sent.sent_at = Some(now);
        store.update(&sent).await.unwrap();

        let mut failed = store.create(make_new(NotificationType::Plain, now)).await.unwrap();
        failed.status = NotificationStatus::Fail;
        failed.retries = 3;
        store.update(&failed).await.unwrap();

        let later = now + chrono::Duration::days(1);
        assert_eq!(store.count_waiting(later).await.unwrap(), 0);
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert!(tx.list_waiting_with_lock(10, later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_update_is_idempotent() {
        let store = MemoryNotificationStore::new();
        let now = Utc::now();
        let mut n = store.create(make_new(NotificationType::Plain, now)).await.unwrap();
        n.status = NotificationStatus::Sent;
        n.sent_at = Some(now);
        let stored = store.update(&n).await.unwrap();

        let again = store.update(&stored).await.unwrap();
        assert_eq!(again.sent_at, Some(now));
        assert_eq!(again.retries, 0);

        let mut moved = stored.clone();
        moved.status = NotificationStatus::Retry;
        moved.sent_at = None;
        moved.retry_at = Some(now);
        let err = store.update(&moved).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Terminal {
                current: NotificationStatus::Sent,
                requested: NotificationStatus::Retry,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invariant_violation_refused() {
        let store = MemoryNotificationStore::new();
        let mut n = store
            .create(make_new(NotificationType::Plain, Utc::now()))
            .await
            .unwrap();
        n.status = NotificationStatus::Sent;

        let err = store.update(&n).await.unwrap_err();
        assert!(matches!(err, StoreError::Invariant { .. }));
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_private() {
        let store = MemoryNotificationStore::new();
        let rows = seed(&store, 1).await;

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let mut n = tx.find_by_id(rows[0].id).await.unwrap();
        n.status = NotificationStatus::Retry;
        n.retries = 1;
        n.retry_at = Some(Utc::now() + chrono::Duration::seconds(5));
        tx.update(&n).await.unwrap();

        assert_eq!(
            store.find_by_id(n.id).await.unwrap().status,
            NotificationStatus::Pending
        );
        assert!(matches!(
            store.update(&n).await.unwrap_err(),
            StoreError::Locked(_)
        ));

        tx.commit().await.unwrap();
        assert_eq!(
            store.find_by_id(n.id).await.unwrap().status,
            NotificationStatus::Retry
        );
    }

    #[tokio::test]
    async fn test_drop_releases_claims_and_discards_writes() {
        let store = MemoryNotificationStore::new();
        seed(&store, 2).await;

        {
            let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
            let claimed = tx.list_waiting_with_lock(10, Utc::now()).await.unwrap();
            assert_eq!(claimed.len(), 2);
            tx.create(make_new(NotificationType::Plain, Utc::now()))
                .await
                .unwrap();
        }

        assert_eq!(store.all().len(), 2);
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert_eq!(tx.list_waiting_with_lock(10, Utc::now()).await.unwrap().len(), 2);
    }
}
