//! Notification routes: enqueue, immediate send, status and backlog size.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{NotificationStatus, NotificationType, Payload};
use herald_engine::store::NotificationStore;

use crate::middleware::auth::AuthCaller;
use crate::state::AppState;

pub fn router<S: NotificationStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/notifications", post(enqueue::<S>))
        .route("/api/notifications/send", post(send_immediately::<S>))
        .route("/api/notifications/{id}/status", get(check_status::<S>))
        .route("/api/notifications/pending/count", get(count_pending::<S>))
}

/// Request body for POST /api/notifications.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub sender_id: i64,
    #[serde(default)]
    pub payload: Payload,
    pub ttl: i32,
    #[serde(default)]
    pub planned_at: Option<DateTime<Utc>>,
}

/// Request body for POST /api/notifications/send.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub sender_id: i64,
    #[serde(default)]
    pub payload: Payload,
    pub ttl: i32,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub id: Uuid,
    pub sent: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub id: Uuid,
    pub status: NotificationStatus,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

/// Malformed bodies are validation errors, reported in the usual error shape.
fn body<T>(request: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    request
        .map(|Json(req)| req)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

fn parse_kind(raw: &str) -> Result<NotificationType, AppError> {
    raw.parse().map_err(AppError::Validation)
}

/// POST /api/notifications: store a pending notification.
async fn enqueue<S: NotificationStore>(
    State(state): State<AppState<S>>,
    caller: AuthCaller,
    request: Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<Json<EnqueueResponse>, AppError> {
    let req = body(request)?;
    let kind = parse_kind(&req.kind)?;

    let id = state
        .service
        .enqueue(kind, req.sender_id, req.payload, req.ttl, req.planned_at)
        .await?;

    tracing::debug!(caller = %caller.subject, notification_id = %id, "Enqueue accepted");
    Ok(Json(EnqueueResponse { id }))
}

/// POST /api/notifications/send: deliver now, record the delivery.
async fn send_immediately<S: NotificationStore>(
    State(state): State<AppState<S>>,
    caller: AuthCaller,
    request: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, AppError> {
    let req = body(request)?;
    let kind = parse_kind(&req.kind)?;

    let receipt = state
        .service
        .send_immediately(kind, req.sender_id, req.payload, req.ttl)
        .await?;

    tracing::debug!(caller = %caller.subject, notification_id = %receipt.id, "Immediate send accepted");
    Ok(Json(SendResponse {
        id: receipt.id,
        sent: receipt.sent,
    }))
}

/// GET /api/notifications/{id}/status
async fn check_status<S: NotificationStore>(
    State(state): State<AppState<S>>,
    _caller: AuthCaller,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    let status = state.service.check_status(id).await?;
    Ok(Json(StatusResponse { id, status }))
}

/// GET /api/notifications/pending/count
async fn count_pending<S: NotificationStore>(
    State(state): State<AppState<S>>,
    _caller: AuthCaller,
) -> Result<Json<CountResponse>, AppError> {
    let count = state.service.count_pending().await?;
    Ok(Json(CountResponse { count }))
}
