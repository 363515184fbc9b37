use crate::alerts::AlertMessage;
use crate::config::SmsConfig;
use crate::error::DeliveryError;
use crate::notify::EmailChannel;

/// SMS via an email-to-text gateway. Delegates to [`EmailChannel`].
#[derive(Clone)]
pub struct SmsChannel {
    email: EmailChannel,
    sender: String,
    gateway_address: String,
}

impl SmsChannel {
    pub fn new(config: &SmsConfig, email: EmailChannel) -> Self {
        Self {
            email,
            sender: config.sender.clone(),
            gateway_address: gateway_address(&config.recipient, &config.sms_gateway_domain),
        }
    }

    pub async fn send(&self, message: &AlertMessage) -> Result<(), DeliveryError> {
        self.email
            .send_from(&self.sender, message, std::slice::from_ref(&self.gateway_address))
            .await
    }
}

pub fn gateway_address(recipient: &str, gateway_domain: &str) -> String {
    format!("{}@{}", recipient.trim(), gateway_domain.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::EmailConfig;
    use crate::test_support::RecordingTransport;

    #[tokio::test]
    async fn sms_goes_to_gateway_address_through_email() {
        let transport = Arc::new(RecordingTransport::new());
        let email = EmailChannel::new(
            &EmailConfig {
                smtp_host: "localhost".into(),
                smtp_port: 25,
                sender: "monitor@example.com".into(),
                recipients: vec!["dba@example.com".into()],
            },
            transport.clone(),
        );
        let sms = SmsChannel::new(
            &SmsConfig {
                sender: "pager@example.com".into(),
                recipient: "5551234".into(),
                sms_gateway_domain: "sms.example.com".into(),
            },
            email,
        );
        let message = AlertMessage {
            subject: "lag".into(),
            body: "300".into(),
        };

        sms.send(&message).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["5551234@sms.example.com"]);
        assert_eq!(sent[0].from, "pager@example.com");
    }
}
