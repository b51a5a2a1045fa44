//! Herald backlog seeder
//!
//! Fills the database with pending `plain` notifications so the worker has a
//! backlog to drain. Every message carries a random serial, which makes rows
//! from different seeding runs easy to tell apart in the delivery log.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin herald-seed
//!
//! # Customize row count
//! SEED_COUNT=5000 cargo run --bin herald-seed
//! ```

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use herald_common::config::AppConfig;
use herald_common::db;
use herald_common::types::NewNotification;
use herald_engine::store::{
    IsolationLevel, PgNotificationStore, PgStoreTransaction, StoreError, StoreTransaction,
    transaction, tx_action,
};
use herald_payloads::{PlainPayload, TypedPayload};

const DEFAULT_COUNT: usize = 1000;
const SEED_TTL: i32 = 40;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_seed=info,herald_engine=warn".into()),
        )
        .init();

    let count: usize = std::env::var("SEED_COUNT")
        .unwrap_or_else(|_| DEFAULT_COUNT.to_string())
        .parse()
        .map_err(|_| anyhow::anyhow!("SEED_COUNT must be a valid usize"))?;

    let config = AppConfig::from_env()?;
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;
    let store = PgNotificationStore::new(pool);

    let serial: u64 = StdRng::from_os_rng().random();
    let planned_at = Utc::now();

    // One transaction: either the whole batch lands or none of it.
    transaction::<_, StoreError>(
        &store,
        IsolationLevel::ReadCommitted,
        vec![tx_action(move |tx: &mut PgStoreTransaction| {
            Box::pin(async move {
                for i in 0..count {
                    let payload =
                        PlainPayload::new(format!("[serial={serial}] notification number {i}"))
                            .to_payload();
                    tx.create(NewNotification::pending(
                        PlainPayload::KIND,
                        0,
                        payload,
                        SEED_TTL,
                        planned_at,
                    ))
                    .await?;
                }
                Ok::<(), StoreError>(())
            })
        })],
    )
    .await?;

    tracing::info!(count, serial, "Seeded pending notifications");
    Ok(())
}
