use std::sync::Arc;

use crate::alerts::AlertMessage;
use crate::config::EmailConfig;
use crate::error::DeliveryError;
use crate::notify::{MailTransport, OutgoingMail};

/// Direct email delivery to the configured recipients.
#[derive(Clone)]
pub struct EmailChannel {
    transport: Arc<dyn MailTransport>,
    sender: String,
    recipients: Vec<String>,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            transport,
            sender: config.sender.clone(),
            recipients: config.recipients.clone(),
        }
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Send `message` from the configured sender to `recipients`.
    pub async fn send(
        &self,
        message: &AlertMessage,
        recipients: &[String],
    ) -> Result<(), DeliveryError> {
        self.send_from(&self.sender, message, recipients).await
    }

    pub async fn send_from(
        &self,
        sender: &str,
        message: &AlertMessage,
        recipients: &[String],
    ) -> Result<(), DeliveryError> {
        let mail = OutgoingMail {
            from: sender.to_string(),
            to: recipients.to_vec(),
            subject: message.subject.clone(),
            body: message.body.clone(),
        };
        self.transport.send(&mail).await
    }
}
