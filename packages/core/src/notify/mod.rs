//! Notification channels.
//!
//! Email is the only transport. SMS is email addressed to a carrier
//! gateway (`<recipient>@<sms_gateway_domain>`) and sent through the same
//! SMTP endpoint, so it shares every failure mode of email and needs
//! `email_configs` even when only SMS alerts are wanted.

pub mod email;
pub mod sms;
pub mod smtp;

use std::sync::Arc;

use async_trait::async_trait;

use crate::alerts::AlertMessage;
use crate::config::NotificationSettings;
use crate::error::DeliveryError;

pub use email::EmailChannel;
pub use sms::SmsChannel;
pub use smtp::SmtpMailer;

/// A fully addressed mail ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Hands mail to an SMTP endpoint.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError>;
}

#[derive(Clone)]
pub enum NotificationChannel {
    Email(EmailChannel),
    Sms(SmsChannel),
}

impl NotificationChannel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Sms(_) => "sms",
        }
    }

    pub async fn send(&self, message: &AlertMessage) -> Result<(), DeliveryError> {
        match self {
            Self::Email(channel) => channel.send(message, channel.recipients()).await,
            Self::Sms(channel) => channel.send(message).await,
        }
    }
}

/// Build the active channels, email first.
pub fn channels_from_settings(
    settings: &NotificationSettings,
    transport: Arc<dyn MailTransport>,
) -> Vec<NotificationChannel> {
    let mut channels = Vec::new();

    if let Some(email) = &settings.email {
        let channel = EmailChannel::new(email, transport);

        if !email.recipients.is_empty() {
            channels.push(NotificationChannel::Email(channel.clone()));
        }
        if let Some(sms) = &settings.sms {
            channels.push(NotificationChannel::Sms(SmsChannel::new(sms, channel)));
        }
    }

    channels
}
