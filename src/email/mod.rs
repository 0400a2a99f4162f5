/// Outbound email delivery
///
/// The scheduler only needs `send(to, subject, body)`; retries and backoff are
/// driven by the scheduler's tick cadence, never by a sender.

use crate::config::{EmailConfig, EmailProviderConfig};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

// Dry-run sender that only logs
pub mod log;

// Mailgun HTTP API sender
pub mod mailgun;

// SMTP relay sender built on lettre
pub mod smtp;

pub use self::log::LogSender;
pub use mailgun::MailgunSender;
pub use smtp::SmtpSender;

/// Capability to deliver one plain-text email
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver the message; a failure carries a descriptive `WorkflowError::Send`
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Build the sender selected by the configuration
pub fn sender_from_config(config: &EmailConfig) -> anyhow::Result<Arc<dyn EmailSender>> {
    let sender: Arc<dyn EmailSender> = match &config.provider {
        EmailProviderConfig::Log => {
            tracing::warn!("📭 Email provider is 'log': messages will be logged, not delivered");
            Arc::new(LogSender)
        }
        EmailProviderConfig::Smtp { host, port, username, password } => {
            if host.is_empty() {
                anyhow::bail!("SMTP provider selected but UPFLO_SMTP_HOST is not set");
            }
            tracing::info!("📮 Using SMTP relay {}:{}", host, port);
            Arc::new(SmtpSender::new(host, *port, username, password, &config.from_address)?)
        }
        EmailProviderConfig::Mailgun { domain, api_key, base_url } => {
            if domain.is_empty() || api_key.is_empty() {
                anyhow::bail!(
                    "Mailgun provider selected but UPFLO_MAILGUN_DOMAIN / \
                     UPFLO_MAILGUN_API_KEY are not set"
                );
            }
            tracing::info!("📮 Using Mailgun domain {}", domain);
            Arc::new(MailgunSender::new(base_url, domain, api_key, &config.from_address))
        }
    };
    Ok(sender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_provider_settings_are_rejected() {
        let config = EmailConfig {
            from_address: "noreply@example.com".to_string(),
            provider: EmailProviderConfig::Mailgun {
                domain: String::new(),
                api_key: "key".to_string(),
                base_url: "https://api.mailgun.net".to_string(),
            },
        };
        assert!(sender_from_config(&config).is_err());
    }

    #[tokio::test]
    async fn log_provider_always_succeeds() {
        let config = EmailConfig {
            from_address: "noreply@example.com".to_string(),
            provider: EmailProviderConfig::Log,
        };
        let sender = sender_from_config(&config).unwrap();
        sender.send("a@x.com", "subject", "body").await.unwrap();
    }
}
