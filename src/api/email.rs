//! Outbound email delivery.
//!
//! The token flows only produce a recipient, a template name and a JSON payload
//! carrying the link; how the message leaves the process is up to the sender.

use anyhow::Result;
use serde_json::json;
use tracing::info;

pub const TEMPLATE_VERIFY_EMAIL: &str = "verify_email";
pub const TEMPLATE_PASSWORD_RESET: &str = "password_reset";

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

impl EmailMessage {
    #[must_use]
    pub fn verify_email(to_email: &str, verify_url: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: TEMPLATE_VERIFY_EMAIL.to_string(),
            payload_json: json!({ "verify_url": verify_url }).to_string(),
        }
    }

    #[must_use]
    pub fn password_reset(to_email: &str, reset_url: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: TEMPLATE_PASSWORD_RESET.to_string(),
            payload_json: json!({ "reset_url": reset_url }).to_string(),
        }
    }
}

pub trait EmailSender: Send + Sync {
    /// Deliver a message.
    ///
    /// # Errors
    /// Returns an error if the message could not be handed off.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_email_payload_carries_link() -> Result<()> {
        let message = EmailMessage::verify_email("a@example.com", "https://n.dev/verify-email#token=t");
        assert_eq!(message.template, TEMPLATE_VERIFY_EMAIL);
        let payload: serde_json::Value = serde_json::from_str(&message.payload_json)?;
        assert_eq!(payload["verify_url"], "https://n.dev/verify-email#token=t");
        Ok(())
    }

    #[test]
    fn log_sender_accepts_everything() {
        let message = EmailMessage::password_reset("a@example.com", "https://n.dev/r");
        assert!(LogEmailSender.send(&message).is_ok());
    }
}
