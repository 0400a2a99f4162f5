/// Mailgun delivery via `POST {base_url}/v3/{domain}/messages`

use crate::email::EmailSender;
use crate::error::{Result, WorkflowError};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct MailgunSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl MailgunSender {
    pub fn new(base_url: &str, domain: &str, api_key: &str, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/v3/{}/messages", base_url.trim_end_matches('/'), domain),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmailSender for MailgunSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let form = [
            ("from", self.from.as_str()),
            ("to", to),
            ("subject", subject),
            ("text", body),
        ];

        let resp = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| WorkflowError::Send(format!("mailgun request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(WorkflowError::Send(format!("mailgun responded {}: {}", status, detail)));
        }

        tracing::debug!("📨 Mailgun accepted message to {}", to);
        Ok(())
    }
}
