/// SMTP delivery through an authenticated STARTTLS relay

use crate::email::EmailSender;
use crate::error::{Result, WorkflowError};
use async_trait::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSender {
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        from: &str,
    ) -> anyhow::Result<Self> {
        let creds = Credentials::new(username.to_string(), password.to_string());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(port)
            .credentials(creds)
            .build();
        let from: Mailbox = from
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid sender address '{}': {}", from, e))?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl EmailSender for SmtpSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| WorkflowError::Send(format!("invalid recipient '{}': {}", to, e)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| WorkflowError::Send(format!("could not build message: {}", e)))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| WorkflowError::Send(format!("smtp delivery failed: {}", e)))?;

        Ok(())
    }
}
