use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::{MailConfig, SMTP_STARTTLS_PORT};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Delivery of a single plain-text email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<()>;
}

/// SMTP with STARTTLS on the submission port, implicit TLS otherwise.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(cfg: &MailConfig) -> Result<Self> {
        let builder = if uses_starttls(cfg.smtp_port) {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)?
        };
        debug!(
            host = %cfg.smtp_host,
            port = cfg.smtp_port,
            starttls = uses_starttls(cfg.smtp_port),
            "SMTP transport configured",
        );
        let transport = builder
            .port(cfg.smtp_port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        Ok(Self { transport })
    }
}

fn uses_starttls(port: u16) -> bool {
    port == SMTP_STARTTLS_PORT
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        let message = build_message(email)?;
        let response = self.transport.send(message).await?;
        info!(code = %response.code(), "Email sent to {}", email.to.join(", "));
        Ok(())
    }
}

/// Logs the message instead of sending it (DRY_RUN).
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        info!(
            to = %email.to.join(", "),
            subject = %email.subject,
            "[DRY RUN] email not sent:\n{}",
            email.body,
        );
        Ok(())
    }
}

pub fn build_message(email: &OutboundEmail) -> Result<Message> {
    let mut builder = Message::builder()
        .from(email.from.parse::<Mailbox>()?)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_PLAIN);
    for to in &email.to {
        builder = builder.to(to.parse::<Mailbox>()?);
    }
    Ok(builder.body(email.body.clone())?)
}
