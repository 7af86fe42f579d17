//! Email rendering and dispatch
//!
//! Renders the three auth messages (verification, resend, password
//! reset) and ships them through the [`Mailer`] capability. The bundled
//! transport posts JSON to an HTTP relay; SMTP mechanics stay outside
//! the subsystem.

use async_trait::async_trait;
use inkpot_core::config::MailConfig;
use inkpot_core::{EmailDetails, MailError, Mailer};
use serde::Serialize;

/// Render the initial verification email
pub fn verification_email(
    config: &MailConfig,
    name: &str,
    to: &str,
    token: &str,
) -> EmailDetails {
    let link = format!("{}/verify-email?token={}", config.client_base_url, token);
    EmailDetails {
        to: to.to_string(),
        subject: format!("Verify email | {}", config.app_name),
        html: format!(
            "<p>Hello {name},</p>\
             <p>Please verify your email by clicking this link:</p>\
             <p><a href=\"{link}\">Verify email</a></p>"
        ),
    }
}

/// Render a re-sent verification email
pub fn resend_verification_email(
    config: &MailConfig,
    name: &str,
    to: &str,
    token: &str,
) -> EmailDetails {
    let link = format!("{}/verify-email?token={}", config.client_base_url, token);
    EmailDetails {
        to: to.to_string(),
        subject: format!("Resent verify email | {}", config.app_name),
        html: format!(
            "<p>Hello {name},</p>\
             <p>Here is your new verification link:</p>\
             <p><a href=\"{link}\">Verify email</a></p>"
        ),
    }
}

/// Render the password reset email
pub fn password_reset_email(
    config: &MailConfig,
    name: &str,
    to: &str,
    token: &str,
) -> EmailDetails {
    let link = format!("{}/reset-password?token={}", config.client_base_url, token);
    EmailDetails {
        to: to.to_string(),
        subject: format!("Forgot password | {}", config.app_name),
        html: format!(
            "<p>Hello {name},</p>\
             <p>Click the link below to choose a new password:</p>\
             <p><a href=\"{link}\">Reset password</a></p>\
             <p>If you did not request this, you can ignore this email.</p>"
        ),
    }
}

/// JSON payload the relay accepts
#[derive(Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// [`Mailer`] that posts rendered messages to an HTTP relay
#[derive(Debug, Clone)]
pub struct HttpMailer {
    http_client: reqwest::Client,
    relay_url: String,
    sender: String,
}

impl HttpMailer {
    /// Build a mailer from the mail section of the configuration.
    ///
    /// The client-level timeout guards the transport; the auth service
    /// adds its own overall bound per send.
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MailError::Service(e.to_string()))?;

        Ok(Self {
            http_client,
            relay_url: config.relay_url.clone(),
            sender: config.sender.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: EmailDetails) -> Result<(), MailError> {
        if !email.to.contains('@') {
            return Err(MailError::InvalidRecipient(email.to));
        }

        let request = RelayRequest {
            from: &self.sender,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
        };

        self.http_client
            .post(&self.relay_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send email: {e}");
                MailError::Service(format!("Failed to send email: {e}"))
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!("Mail relay returned error: {e}");
                MailError::Service(format!("Mail relay error: {e}"))
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_email_rendering() {
        let config = MailConfig::default();
        let email = verification_email(&config, "Alice", "alice@blog.io", "tok-123");

        assert_eq!(email.to, "alice@blog.io");
        assert_eq!(email.subject, "Verify email | Inkpot");
        assert!(email.html.contains("Hello Alice"));
        assert!(email
            .html
            .contains("http://localhost:3000/verify-email?token=tok-123"));
    }

    #[test]
    fn test_resend_email_subject_differs() {
        let config = MailConfig::default();
        let first = verification_email(&config, "Bob", "bob@blog.io", "t");
        let resent = resend_verification_email(&config, "Bob", "bob@blog.io", "t");

        assert_ne!(first.subject, resent.subject);
        assert!(resent.subject.starts_with("Resent verify email"));
    }

    #[test]
    fn test_password_reset_email_rendering() {
        let mut config = MailConfig::default();
        config.client_base_url = "https://blog.io".to_string();

        let email = password_reset_email(&config, "Carol", "carol@blog.io", "reset-9");

        assert_eq!(email.subject, "Forgot password | Inkpot");
        assert!(email
            .html
            .contains("https://blog.io/reset-password?token=reset-9"));
    }

    #[tokio::test]
    async fn test_http_mailer_rejects_bad_recipient() {
        let mailer = HttpMailer::new(&MailConfig::default()).unwrap();

        let result = mailer
            .send(EmailDetails {
                to: "not-an-address".to_string(),
                subject: "s".to_string(),
                html: "h".to_string(),
            })
            .await;

        assert!(matches!(result, Err(MailError::InvalidRecipient(_))));
    }
}
