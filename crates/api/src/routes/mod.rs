pub mod health;
pub mod notifications;

use axum::Router;
use herald_engine::store::NotificationStore;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router<S: NotificationStore>(state: AppState<S>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(notifications::router())
        .with_state(state)
}
