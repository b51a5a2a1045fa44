//! Worker pool loop.
//!
//! Alternates between idle-waiting and draining. A draining pass sizes itself
//! from the backlog, runs that many processing cycles side by side and waits for
//! all of them before looking at the backlog again.

use std::time::Duration;

use herald_common::config::AppConfig;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::EngineError;
use crate::processor::Processor;
use crate::store::NotificationStore;

pub const DEFAULT_BATCH_LIMIT: usize = 10;
pub const DEFAULT_MAX_WORKERS: usize = 10;
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Rows claimed per cycle.
    pub batch_limit: usize,
    /// Upper bound on cycles running at once.
    pub max_workers: usize,
    /// Sleep between backlog checks when nothing is due.
    pub idle_interval: Duration,
    /// Return after the first pass, or as soon as the backlog is empty.
    pub run_once: bool,
}

impl PoolConfig {
    pub fn from_config(config: &AppConfig, run_once: bool) -> Self {
        Self {
            batch_limit: config.worker_batch_limit,
            max_workers: config.worker_max_workers,
            idle_interval: Duration::from_millis(config.worker_idle_interval_ms),
            run_once,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            max_workers: DEFAULT_MAX_WORKERS,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            run_once: false,
        }
    }
}

/// Totals over the lifetime of one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub iterations: usize,
    pub found: usize,
    pub processed: usize,
    pub failed_cycles: usize,
}

#[derive(Debug, Default)]
struct PassReport {
    found: usize,
    processed: usize,
    failed: usize,
}

/// How many cycles to run for a backlog of `count` rows.
///
/// `ceil(count / batch_limit)`, capped at `max_workers` and never below one.
pub fn compute_concurrency(count: i64, batch_limit: usize, max_workers: usize) -> usize {
    let count = u64::try_from(count).unwrap_or(0);
    let batch = u64::try_from(batch_limit.max(1)).unwrap_or(u64::MAX);
    let needed = usize::try_from(count.div_ceil(batch)).unwrap_or(usize::MAX);
    needed.min(max_workers).max(1)
}

pub struct WorkerPool<S> {
    processor: Processor<S>,
    config: PoolConfig,
}

impl<S: NotificationStore> WorkerPool<S> {
    pub fn new(processor: Processor<S>, config: PoolConfig) -> Self {
        Self { processor, config }
    }

    /// Run until `shutdown` fires or, in one-shot mode, until the first pass.
    ///
    /// Cancellation is checked between iterations; cycles already spawned are
    /// always awaited. A failed backlog count is fatal only in one-shot mode.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<PoolReport, EngineError> {
        let mut report = PoolReport::default();

        tracing::info!(
            batch_limit = self.config.batch_limit,
            max_workers = self.config.max_workers,
            idle_interval_ms = self.config.idle_interval.as_millis() as u64,
            run_once = self.config.run_once,
            "Worker pool started"
        );

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Worker pool received shutdown signal");
                break;
            }
            report.iterations += 1;

            let now = self.processor.context().clock.now();
            let count = match self.processor.store().count_waiting(now).await {
                Ok(count) => count,
                Err(e) if self.config.run_once => return Err(EngineError::Store(e)),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to count waiting notifications");
                    if self.idle(&shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if count == 0 {
                if self.config.run_once {
                    tracing::info!("No waiting notifications, exiting");
                    break;
                }
                if self.idle(&shutdown).await {
                    break;
                }
                continue;
            }

            let workers =
                compute_concurrency(count, self.config.batch_limit, self.config.max_workers);
            let pass = self.drain(workers).await;

            report.found += pass.found;
            report.processed += pass.processed;
            report.failed_cycles += pass.failed;

            tracing::info!(
                waiting = count,
                workers,
                found = pass.found,
                processed = pass.processed,
                failed_cycles = pass.failed,
                "Processing pass finished"
            );

            if self.config.run_once {
                break;
            }
        }

        tracing::info!(
            iterations = report.iterations,
            found = report.found,
            processed = report.processed,
            failed_cycles = report.failed_cycles,
            "Worker pool stopped"
        );
        Ok(report)
    }

    async fn drain(&self, workers: usize) -> PassReport {
        // A cycle that claims nothing would leave the backlog untouched.
        let limit = self.config.batch_limit.max(1);
        let mut cycles = JoinSet::new();
        for _ in 0..workers {
            let processor = self.processor.clone();
            cycles.spawn(async move { processor.process(limit).await });
        }

        let mut pass = PassReport::default();
        while let Some(joined) = cycles.join_next().await {
            match joined {
                Ok(Ok(cycle)) => {
                    pass.found += cycle.found;
                    pass.processed += cycle.processed;
                }
                Ok(Err(failure)) => {
                    tracing::error!(
                        found = failure.found,
                        error = %failure.error,
                        "Processing cycle rolled back"
                    );
                    pass.found += failure.found;
                    pass.failed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Processing cycle task panicked");
                    pass.failed += 1;
                }
            }
        }
        pass
    }

    /// Sleep for the idle interval. Returns `true` if shutdown fired first.
    async fn idle(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            () = shutdown.cancelled() => true,
            () = tokio::time::sleep(self.config.idle_interval) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use herald_common::types::{NewNotification, NotificationStatus, NotificationType, Payload};
    use herald_notifier::channels::PlainChannel;
    use herald_notifier::senders::PlainSender;
    use herald_notifier::{SendError, SenderRegistry};
    use parking_lot::Mutex;

    use super::*;
    use crate::backoff::RetryPolicy;
    use crate::clock::{Clock, ManualClock};
    use crate::processor::CycleContext;
    use crate::store::MemoryNotificationStore;

    #[derive(Default)]
    struct RecordingPlain {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlainSender for RecordingPlain {
        async fn send(&self, message: &str) -> Result<(), SendError> {
            self.sent.lock().push(message.to_string());
            Ok(())
        }
    }

    async fn make_pool(
        rows: usize,
        config: PoolConfig,
    ) -> (
        WorkerPool<MemoryNotificationStore>,
        Arc<MemoryNotificationStore>,
        Arc<RecordingPlain>,
    ) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryNotificationStore::with_clock(clock.clone()));
        let sender = Arc::new(RecordingPlain::default());

        for i in 0..rows {
            store
                .create(NewNotification::pending(
                    NotificationType::Plain,
                    1,
                    Payload::new().with("message", format!("notification number {i}")),
                    40,
                    clock.now(),
                ))
                .await
                .unwrap();
        }

        let processor = Processor::new(
            store.clone(),
            CycleContext {
                registry: Arc::new(
                    SenderRegistry::new().with_handler(PlainChannel::new(sender.clone())),
                ),
                clock,
                policy: RetryPolicy::default(),
            },
        );
        (WorkerPool::new(processor, config), store, sender)
    }

    fn one_shot() -> PoolConfig {
        PoolConfig {
            run_once: true,
            ..PoolConfig::default()
        }
    }

    #[test]
    fn test_compute_concurrency_bounds() {
        for batch_limit in [1, 3, 10, 25] {
            for max_workers in [1, 4, 10] {
                for count in 1..=300i64 {
                    let workers = compute_concurrency(count, batch_limit, max_workers);
                    assert!(workers >= 1 && workers <= max_workers);

                    let needed = (count as usize).div_ceil(batch_limit);
                    if needed <= max_workers {
                        assert_eq!(workers, needed, "count={count} batch={batch_limit}");
                    } else {
                        assert_eq!(workers, max_workers);
                    }
                }
            }
        }
    }

    #[test]
    fn test_compute_concurrency_degenerate_inputs() {
        assert_eq!(compute_concurrency(0, 10, 10), 1);
        assert_eq!(compute_concurrency(-5, 10, 10), 1);
        assert_eq!(compute_concurrency(100, 0, 10), 10);
        assert_eq!(compute_concurrency(100, 10, 0), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_shot_passes_drain_backlog_without_duplicates() {
        let (pool, store, sender) = make_pool(1000, one_shot()).await;

        for pass in 0..10 {
            let report = pool.run(CancellationToken::new()).await.unwrap();
            assert_eq!(report.found, 100, "pass {pass}");
            assert_eq!(report.processed, 100, "pass {pass}");
            assert_eq!(report.failed_cycles, 0);
        }

        let report = pool.run(CancellationToken::new()).await.unwrap();
        assert_eq!(report, PoolReport { iterations: 1, ..PoolReport::default() });

        let sent = sender.sent.lock();
        assert_eq!(sent.len(), 1000);
        assert_eq!(sent.iter().collect::<HashSet<_>>().len(), 1000);
        assert!(
            store
                .all()
                .iter()
                .all(|n| n.status == NotificationStatus::Sent)
        );
    }

    #[tokio::test]
    async fn test_one_shot_returns_on_empty_backlog() {
        let (pool, _store, sender) = make_pool(0, one_shot()).await;
        let report = pool.run(CancellationToken::new()).await.unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.found, 0);
        assert!(sender.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_does_nothing() {
        let (pool, _store, sender) = make_pool(5, PoolConfig::default()).await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let report = pool.run(shutdown).await.unwrap();
        assert_eq!(report.iterations, 0);
        assert!(sender.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_continuous_mode_drains_then_stops_on_cancel() {
        let config = PoolConfig {
            batch_limit: 4,
            max_workers: 3,
            idle_interval: Duration::from_millis(10),
            run_once: false,
        };
        let (pool, store, sender) = make_pool(25, config).await;
        let shutdown = CancellationToken::new();

        let handle = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { pool.run(shutdown).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.count_waiting(Utc::now()).await.unwrap() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("backlog was not drained");

        shutdown.cancel();
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.processed, 25);
        assert_eq!(sender.sent.lock().len(), 25);
    }

    #[tokio::test]
    async fn test_zero_batch_limit_still_claims_rows() {
        let config = PoolConfig {
            batch_limit: 0,
            max_workers: 2,
            idle_interval: Duration::from_millis(10),
            run_once: false,
        };
        let (pool, store, sender) = make_pool(5, config).await;
        let shutdown = CancellationToken::new();

        let handle = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { pool.run(shutdown).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.count_waiting(Utc::now()).await.unwrap() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("backlog was not drained");

        shutdown.cancel();
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.processed, 5);
        assert_eq!(sender.sent.lock().len(), 5);
    }
}
