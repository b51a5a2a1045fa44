//! Shared application state for the Axum API server.

use herald_common::config::AppConfig;
use herald_engine::NotificationService;
use herald_engine::store::PgNotificationStore;

/// Application state shared across all route handlers via Axum `State`.
///
/// Generic over the store so routes can run against the in-memory store.
pub struct AppState<S = PgNotificationStore> {
    pub service: NotificationService<S>,
    pub config: AppConfig,
}

impl<S> AppState<S> {
    pub fn new(service: NotificationService<S>, config: AppConfig) -> Self {
        Self { service, config }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            config: self.config.clone(),
        }
    }
}
