//! Mail delivery.

use crate::error::{MailError, MailResult};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use taaza_config::SmtpConfig;
use tracing::{debug, info};

/// Sends one composed email.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver an HTML `body` to `to`.
    async fn send(&self, to: &str, subject: &str, body: &str) -> MailResult<()>;
}

/// SMTP relay transport.
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpTransport {
    /// Build a pooled transport for the configured relay. No connection is made here.
    pub fn new(config: &SmtpConfig) -> MailResult<Self> {
        let sender = config.sender();
        if sender.is_empty() {
            return Err(MailError::Configuration(
                "SMTP sender is not configured (smtp.from or smtp.username)".to_string(),
            ));
        }

        let address: Address = sender
            .parse()
            .map_err(|e| MailError::Configuration(format!("Invalid SMTP sender '{sender}': {e}")))?;
        let name = (!config.from_name.is_empty()).then(|| config.from_name.clone());
        let from = Mailbox::new(name, address);

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Configuration(format!("Invalid SMTP relay: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port).timeout(Some(config.timeout()));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        info!(
            host = %config.host,
            port = config.port,
            starttls = config.starttls,
            from = %from,
            "Configured SMTP transport"
        );

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }

    /// Build the MIME message.
    fn message(&self, to: &str, subject: &str, body: &str) -> MailResult<Message> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| MailError::Transport(format!("Invalid recipient '{to}': {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| MailError::Transport(format!("Failed to build message: {e}")))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> MailResult<()> {
        let message = self.message(to, subject, body)?;
        let response = self
            .mailer
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        debug!(to, code = %response.code(), "SMTP relay accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_relay() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            from: "noreply@taaza.in".to_string(),
            starttls: false,
            ..SmtpConfig::default()
        }
    }

    #[test]
    fn test_requires_sender() {
        let config = SmtpConfig {
            starttls: false,
            ..SmtpConfig::default()
        };
        assert!(matches!(
            SmtpTransport::new(&config),
            Err(MailError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_invalid_sender() {
        let config = SmtpConfig {
            from: "not an address".to_string(),
            ..local_relay()
        };
        assert!(SmtpTransport::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_builds_html_message() {
        let transport = SmtpTransport::new(&local_relay()).unwrap();
        let message = transport
            .message("a@x.com", "Your OTP Code - Taaza", "<p>482913</p>")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: a@x.com"));
        assert!(raw.contains("Subject: Your OTP Code - Taaza"));
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("From: Taaza <noreply@taaza.in>"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_transport_error() {
        let transport = SmtpTransport::new(&local_relay()).unwrap();
        assert!(matches!(
            transport.message("nobody", "Hi", "<p>hi</p>"),
            Err(MailError::Transport(_))
        ));
    }
}
