use async_trait::async_trait;

use super::PlainSender;
use crate::SendError;

/// Delivers plain messages as structured log lines on the `herald::plain` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPlainSender;

impl LogPlainSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlainSender for LogPlainSender {
    async fn send(&self, message: &str) -> Result<(), SendError> {
        tracing::info!(target: "herald::plain", text = %message, "Plain notification delivered");
        Ok(())
    }
}
