use std::sync::Arc;

use herald_common::config::AppConfig;
use herald_common::db;
use herald_engine::backoff::RetryPolicy;
use herald_engine::clock::SystemClock;
use herald_engine::store::PgNotificationStore;
use herald_engine::{CycleContext, PoolConfig, Processor, WorkerPool};
use herald_notifier::SenderRegistry;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "herald_worker=info,herald_engine=info,herald_notifier=info,herald=info".into()
            }),
        )
        .json()
        .init();

    let run_once = std::env::args().skip(1).any(|arg| arg == "--once");
    tracing::info!(run_once, "Herald worker starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let registry = SenderRegistry::from_config(&config)?;
    let store = PgNotificationStore::new(pool).with_channels(registry.channels());

    let processor = Processor::new(
        Arc::new(store),
        CycleContext {
            registry: Arc::new(registry),
            clock: Arc::new(SystemClock),
            policy: RetryPolicy::from_config(&config),
        },
    );
    let worker = WorkerPool::new(processor, PoolConfig::from_config(&config, run_once));

    // Stop taking new work on Ctrl+C; cycles already running finish first.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received shutdown signal, stopping gracefully...");
                shutdown.cancel();
            }
        });
    }

    let report = worker.run(shutdown).await.inspect_err(|e| {
        tracing::error!(error = %e, "Worker pool exited with error");
    })?;

    tracing::info!(
        iterations = report.iterations,
        processed = report.processed,
        failed_cycles = report.failed_cycles,
        "Herald worker stopped."
    );
    Ok(())
}
