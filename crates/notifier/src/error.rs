use herald_common::types::NotificationType;
use herald_payloads::ValidationError;
use thiserror::Error;

/// A channel failed to deliver.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{channel} rejected the request ({status}): {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0}")]
    Channel(String),
}

/// Routing a payload to its sender failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no sender registered for notification type '{0}'")]
    NoHandler(NotificationType),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Send(#[from] SendError),
}
