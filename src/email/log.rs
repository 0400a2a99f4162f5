/// Sender used when no provider is configured

use crate::email::EmailSender;
use crate::error::Result;
use async_trait::async_trait;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl EmailSender for LogSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        tracing::info!("✉️ [dry-run] to={} subject={:?} ({} bytes)", to, subject, body.len());
        Ok(())
    }
}
