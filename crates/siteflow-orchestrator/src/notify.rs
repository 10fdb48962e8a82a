//! Completion notifications
//!
//! Fire-and-forget from the orchestrator's perspective; delivery transport
//! (SMTP, webhook, ...) lives behind the trait.

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Notifier that only logs; the default when no transport is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        tracing::info!(to, subject, body_len = body.len(), "Notification");
        Ok(())
    }
}
