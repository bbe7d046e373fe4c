use async_trait::async_trait;
use lettre::{
    message::Mailbox,
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::{error, info};

use crate::config::SmtpConfig;
use crate::error::{WorkflowError, WorkflowResult};

#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send_email(&self, to: &[String], subject: &str, body: &str) -> WorkflowResult<()>;
}

/// Delivers workflow emails over SMTP.
#[derive(Debug, Clone)]
pub struct SmtpEmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl SmtpEmailService {
    pub fn new(smtp_config: &SmtpConfig) -> Self {
        let creds = Credentials::new(smtp_config.username.clone(), smtp_config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        SmtpEmailService {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        }
    }

    fn build_message(&self, to: &[String], subject: &str, body: &str) -> WorkflowResult<Message> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| WorkflowError::ActionConfig(format!("invalid sender address: {}", e)))?;

        let mut builder = Message::builder().from(from).subject(subject);
        for recipient in to {
            let mailbox = recipient
                .parse::<Mailbox>()
                .map_err(|e| WorkflowError::ActionExecution(format!("invalid recipient '{}': {}", recipient, e)))?;
            builder = builder.to(mailbox);
        }

        builder
            .body(body.to_string())
            .map_err(|e| WorkflowError::ActionExecution(format!("failed to build email: {}", e)))
    }
}

#[async_trait]
impl EmailService for SmtpEmailService {
    async fn send_email(&self, to: &[String], subject: &str, body: &str) -> WorkflowResult<()> {
        let message = self.build_message(to, subject, body)?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email sent successfully to {}", to.join(", "));
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", to.join(", "), e);
                Err(WorkflowError::ActionExecution(format!("SMTP delivery failed: {}", e)))
            }
        }
    }
}

/// Used when SMTP is not configured: records the email in the log only.
#[derive(Debug, Clone, Default)]
pub struct LogEmailService;

#[async_trait]
impl EmailService for LogEmailService {
    async fn send_email(&self, to: &[String], subject: &str, _body: &str) -> WorkflowResult<()> {
        info!(recipients = %to.join(", "), subject, "SMTP not configured; email logged only");
        Ok(())
    }
}
