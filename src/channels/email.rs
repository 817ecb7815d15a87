//! Email channel

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{ChannelError, ChannelSender, DeliveryAttempt, DispatchOutcome};
use crate::alerts::{AlertRecord, Template};
use crate::config::EmailConfig;

/// Hands a finished message to a mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, message: Message) -> Result<(), ChannelError>;
}

/// SMTP mailer using STARTTLS
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build the transport. No connection is made until the first send.
    pub fn from_config(config: &EmailConfig) -> Result<Self, ChannelError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
            .map_err(|e| ChannelError::Config(format!("Failed to create SMTP transport: {}", e)))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let Some((user, password)) = config.credentials() {
            builder = builder.credentials(Credentials::new(user.to_string(), password.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, message: Message) -> Result<(), ChannelError> {
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::Delivery(format!("Failed to send email: {}", e)))
    }
}

/// Sends each alert as one HTML email to all configured recipients
pub struct EmailSender {
    config: EmailConfig,
    subject: Template,
    body: Template,
    mailer: Option<Arc<dyn Mailer>>,
}

impl EmailSender {
    /// Build from configuration, creating an SMTP mailer when a server is set
    pub fn from_config(config: EmailConfig) -> Result<Self, ChannelError> {
        let mailer: Option<Arc<dyn Mailer>> = if config.enabled && !config.smtp_server.is_empty() {
            Some(Arc::new(SmtpMailer::from_config(&config)?))
        } else {
            None
        };
        Self::with_mailer(config, mailer)
    }

    /// Compile the templates and pair them with a mailer
    pub fn with_mailer(
        config: EmailConfig,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Result<Self, ChannelError> {
        let subject = Template::new(config.subject_template.clone())
            .map_err(|e| ChannelError::Config(format!("Invalid subject template: {}", e)))?;
        let body = Template::new(config.body_template.clone())
            .map_err(|e| ChannelError::Config(format!("Invalid body template: {}", e)))?;

        Ok(Self {
            config,
            subject,
            body,
            mailer,
        })
    }

    fn mailer(&self) -> Result<&Arc<dyn Mailer>, ChannelError> {
        if !self.config.enabled {
            return Err(ChannelError::Unavailable("email alerts disabled".to_string()));
        }
        if self.config.to_addresses.is_empty() {
            return Err(ChannelError::Unavailable(
                "no recipient email addresses configured".to_string(),
            ));
        }
        self.mailer
            .as_ref()
            .ok_or_else(|| ChannelError::Unavailable("no SMTP server configured".to_string()))
    }

    /// Render the alert into a message addressed to every recipient
    pub fn build_message(&self, alert: &AlertRecord) -> Result<Message, ChannelError> {
        let from: Mailbox = self
            .config
            .from_address
            .parse()
            .map_err(|e| ChannelError::Delivery(format!("Invalid from address: {}", e)))?;

        let subject = self
            .subject
            .render(alert)
            .map_err(|e| ChannelError::Delivery(format!("Failed to render subject: {}", e)))?;
        let body = self
            .body
            .render(alert)
            .map_err(|e| ChannelError::Delivery(format!("Failed to render body: {}", e)))?;

        let mut builder = Message::builder().from(from).subject(subject.trim().to_string());

        for address in &self.config.to_addresses {
            let to: Mailbox = address.parse().map_err(|e| {
                ChannelError::Delivery(format!("Invalid to address {}: {}", address, e))
            })?;
            builder = builder.to(to);
        }

        builder
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| ChannelError::Delivery(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn name(&self) -> &str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, alert: &AlertRecord) -> DispatchOutcome {
        let mailer = match self.mailer() {
            Ok(mailer) => mailer,
            Err(e) => {
                tracing::info!(channel = "email", "Skipping email alert: {}", e);
                return DispatchOutcome::failed(self.name(), &e);
            }
        };

        let recipients = self.config.to_addresses.join(", ");
        let result = match self.build_message(alert) {
            Ok(message) => mailer.deliver(message).await,
            Err(e) => Err(e),
        };

        let attempt = match result {
            Ok(()) => {
                tracing::info!(channel = "email", "Email alert sent to {}", recipients);
                DeliveryAttempt::ok(recipients)
            }
            Err(e) => {
                tracing::error!(channel = "email", error = %e, "Failed to send email alert");
                DeliveryAttempt::failed(recipients, &e)
            }
        };

        DispatchOutcome::from_attempts(self.name(), vec![attempt])
    }
}
