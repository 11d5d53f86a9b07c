use async_trait::async_trait;
use lettre::{
    address::AddressError,
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport misconfigured: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),

    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    PasswordReset,
    EmailConfirmation,
}

/// One out-of-band message carrying a single-use secret.
#[derive(Clone)]
pub struct OutboundMail {
    pub to: String,
    pub kind: MailKind,
    pub link: String,
    pub secret: String,
}

impl std::fmt::Debug for OutboundMail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundMail")
            .field("to", &self.to)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl OutboundMail {
    /// Subject and plain-text body.
    pub fn render(&self) -> (&'static str, String) {
        match self.kind {
            MailKind::PasswordReset => (
                "Password reset token",
                format!(
                    "You are receiving this email because you (or someone else) requested a password reset.\n\n\
                     Make a PUT request with your new password to:\n\n{}\n\n\
                     If you did not request this, ignore this email.",
                    self.link
                ),
            ),
            MailKind::EmailConfirmation => (
                "Email confirmation token",
                format!(
                    "You are receiving this email because you need to confirm your email address.\n\n\
                     Open this link to confirm it:\n\n{}",
                    self.link
                ),
            ),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError>;
}

/// Relays mail through the configured SMTP server.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let host = config
            .smtp_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| MailError::Config("SMTP_HOST is not set".to_string()))?;
        let from: Mailbox = config.from_address.parse()?;

        let mut builder = if config.smtp_insecure {
            SmtpTransport::builder_dangerous(host)
        } else {
            SmtpTransport::starttls_relay(host).map_err(|e| MailError::Config(e.to_string()))?
        };
        builder = builder
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));
        if let (Some(user), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        tracing::info!("SMTP mailer relaying through {}:{}", host, config.smtp_port);
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn message(&self, mail: &OutboundMail) -> Result<Message, MailError> {
        let (subject, body) = mail.render();
        Message::builder()
            .from(self.from.clone())
            .to(mail.to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| MailError::Delivery(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        let message = self.message(&mail)?;

        // SmtpTransport blocks; keep it off the runtime threads
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?
            .map_err(|e| {
                tracing::error!(to = %mail.to, error = %e, "Failed to send mail");
                MailError::Delivery(e.to_string())
            })?;

        tracing::info!(to = %mail.to, kind = ?mail.kind, "Mail sent");
        Ok(())
    }
}

/// Development mailer: writes the whole message, link included, to the log.
/// Configuration validation keeps it out of staging and production.
#[derive(Default)]
pub struct TracingMailer;

impl TracingMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        let (subject, body) = mail.render();
        tracing::info!("Mail {:?} to {}: {}\n{}", mail.kind, mail.to, subject, body);
        Ok(())
    }
}

/// Keeps sent mail in memory so callers can read secrets back.
#[derive(Default)]
pub struct MemoryOutbox {
    sent: Mutex<Vec<OutboundMail>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Secret of the most recent mail of `kind` sent to `to`.
    pub async fn last_secret(&self, to: &str, kind: MailKind) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|m| m.to == to && m.kind == kind)
            .map(|m| m.secret.clone())
    }

    pub async fn len(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Mailer for MemoryOutbox {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        self.sent.lock().await.push(mail);
        Ok(())
    }
}
