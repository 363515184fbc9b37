//! SMTP transport backed by `lettre`.
//!
//! Plain SMTP without authentication. A fresh transport is built for each
//! mail, so the connection lives only for that transmission.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;
use crate::error::DeliveryError;
use crate::notify::{MailTransport, OutgoingMail};

/// Display name used in the `From` header.
pub const SENDER_NAME: &str = "Replication Monitor";

#[derive(Debug, Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
}

impl SmtpMailer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn from_config(config: &EmailConfig) -> Self {
        Self::new(config.smtp_host.clone(), config.smtp_port)
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        let message = build_message(mail)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.host.as_str())
            .port(self.port)
            .build();

        transport.send(message).await.map_err(|err| {
            DeliveryError::transport(format!("{}:{}: {}", self.host, self.port, err))
        })?;

        tracing::debug!(
            "Delivered \"{}\" to {} via {}:{}",
            mail.subject,
            mail.to.join(", "),
            self.host,
            self.port
        );
        Ok(())
    }
}

fn build_message(mail: &OutgoingMail) -> Result<Message, DeliveryError> {
    let from = Mailbox::new(Some(SENDER_NAME.to_string()), parse_address(&mail.from)?);

    let mut builder = Message::builder()
        .from(from)
        .subject(mail.subject.as_str())
        .header(ContentType::TEXT_PLAIN);

    for to in &mail.to {
        builder = builder.to(Mailbox::new(None, parse_address(to)?));
    }

    builder
        .body(mail.body.clone())
        .map_err(|err| DeliveryError::Message {
            message: err.to_string(),
        })
}

fn parse_address(raw: &str) -> Result<Address, DeliveryError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|err| DeliveryError::Address {
            address: raw.to_string(),
            message: err.to_string(),
        })
}
