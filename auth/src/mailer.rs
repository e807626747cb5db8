//! Email delivery for password-reset and verification tokens.
//!
//! Delivery is a seam: the local provider composes the message, an
//! implementation carries it. Failures are wrapped provider errors and must
//! never reveal to the *caller* whether the recipient account exists.

use crate::error::{AuthError, Result};
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

/// Outbound mail contract used by the local provider.
pub trait Mailer: Send + Sync {
    /// Deliver a password-reset token.
    ///
    /// # Errors
    ///
    /// Returns error if delivery fails.
    fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Deliver an email-verification token.
    ///
    /// # Errors
    ///
    /// Returns error if delivery fails.
    fn send_email_verification(
        &self,
        to: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Compose the reset mail body. The token sits on its own final line.
#[must_use]
pub fn password_reset_body(token: &str, expires_at: DateTime<Utc>) -> String {
    let expires_minutes = (expires_at - Utc::now()).num_minutes();
    format!(
        "Use the code below to reset your password.\n\
         It expires in {expires_minutes} minutes.\n\
         {token}"
    )
}

/// Compose the verification mail body. The token sits on its own final line.
#[must_use]
pub fn email_verification_body(token: &str, expires_at: DateTime<Utc>) -> String {
    let expires_minutes = (expires_at - Utc::now()).num_minutes();
    format!(
        "Use the code below to verify your email address.\n\
         It expires in {expires_minutes} minutes.\n\
         {token}"
    )
}

/// Console mailer for development and testing.
///
/// Logs messages instead of sending them.
#[derive(Clone, Debug, Default)]
pub struct ConsoleMailer;

impl ConsoleMailer {
    /// Create a new console mailer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Mailer for ConsoleMailer {
    async fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        info!(
            to = %to,
            expires_at = %expires_at,
            "password reset email (development mode):\n{}",
            password_reset_body(token, expires_at)
        );
        Ok(())
    }

    async fn send_email_verification(
        &self,
        to: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        info!(
            to = %to,
            expires_at = %expires_at,
            "email verification email (development mode):\n{}",
            email_verification_body(token, expires_at)
        );
        Ok(())
    }
}

/// SMTP mailer over Lettre, suitable for production use.
#[derive(Clone)]
pub struct SmtpMailer {
    /// SMTP server address (e.g. "smtp.example.com").
    smtp_server: String,

    /// SMTP server port (usually 587 for TLS).
    smtp_port: u16,

    /// SMTP credentials.
    credentials: Credentials,

    /// Sender address, e.g. "Opsuite <noreply@example.com>".
    from: String,
}

impl SmtpMailer {
    /// Create a new SMTP mailer.
    #[must_use]
    pub fn new(
        smtp_server: String,
        smtp_port: u16,
        smtp_username: String,
        smtp_password: String,
        from: String,
    ) -> Self {
        Self {
            smtp_server,
            smtp_port,
            credentials: Credentials::new(smtp_username, smtp_password),
            from,
        }
    }

    async fn deliver(&self, to: &str, subject: &str, body: String) -> Result<()> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| AuthError::Provider(format!("invalid sender address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| AuthError::Provider(format!("invalid recipient address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AuthError::Provider(format!("failed to build email: {e}")))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp_server)
            .map_err(|e| AuthError::Provider(format!("smtp relay error: {e}")))?
            .port(self.smtp_port)
            .credentials(self.credentials.clone())
            .build();

        transport
            .send(message)
            .await
            .map_err(|e| AuthError::Provider(format!("smtp send failed: {e}")))?;

        Ok(())
    }
}

impl Mailer for SmtpMailer {
    async fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.deliver(
            to,
            "Reset your password",
            password_reset_body(token, expires_at),
        )
        .await
    }

    async fn send_email_verification(
        &self,
        to: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.deliver(
            to,
            "Verify your email address",
            email_verification_body(token, expires_at),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_bodies_end_with_the_token() {
        let expires = Utc::now() + Duration::minutes(60);
        let body = password_reset_body("tok-123", expires);
        assert_eq!(body.lines().last(), Some("tok-123"));

        let body = email_verification_body("tok-456", expires);
        assert_eq!(body.lines().last(), Some("tok-456"));
    }
}
