use herald_common::error::AppError;
use herald_notifier::DispatchError;
use herald_payloads::ValidationError;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Dispatch(DispatchError),

    #[error("failed to claim notifications: {0}")]
    Claim(#[source] StoreError),

    #[error("failed to persist notification: {0}")]
    Persistence(#[source] StoreError),

    #[error("transaction failed: {0}")]
    Transaction(#[source] StoreError),

    #[error(transparent)]
    Store(StoreError),

    #[error("notification {0} not found")]
    NotFound(Uuid),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<DispatchError> for EngineError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Validation(v) => EngineError::Validation(v),
            other => EngineError::Dispatch(other),
        }
    }
}

/// Begin and commit failures surface through the transaction helper.
impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Transaction(e)
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(v) => AppError::Validation(v.to_string()),
            EngineError::InvalidRequest(msg) => AppError::Validation(msg),
            EngineError::NotFound(id) | EngineError::Store(StoreError::NotFound(id)) => {
                AppError::NotFound(format!("Notification {id} not found"))
            }
            EngineError::Dispatch(DispatchError::NoHandler(kind)) => {
                AppError::Validation(format!("No sender configured for notification type '{kind}'"))
            }
            EngineError::Dispatch(other) => AppError::Delivery(other.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}
