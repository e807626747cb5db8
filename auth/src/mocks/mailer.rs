//! Capturing mailer mock.

use crate::error::Result;
use crate::mailer::Mailer;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};

/// A captured outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedMail {
    /// Recipient address.
    pub to: String,

    /// Which flow sent it ("password_reset" or "email_verification").
    pub kind: &'static str,

    /// The raw token that was delivered.
    pub token: String,

    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

/// Mailer that captures messages instead of sending them.
#[derive(Clone, Default)]
pub struct MockMailer {
    outbox: Arc<Mutex<Vec<CapturedMail>>>,
}

impl MockMailer {
    /// Create an empty mock mailer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every captured message, oldest first.
    #[must_use]
    pub fn outbox(&self) -> Vec<CapturedMail> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The token carried by the most recent message, if any.
    #[must_use]
    pub fn last_token(&self) -> Option<String> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|mail| mail.token.clone())
    }

    fn capture(&self, mail: CapturedMail) {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mail);
    }
}

impl Mailer for MockMailer {
    async fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.capture(CapturedMail {
            to: to.to_string(),
            kind: "password_reset",
            token: token.to_string(),
            expires_at,
        });
        Ok(())
    }

    async fn send_email_verification(
        &self,
        to: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.capture(CapturedMail {
            to: to.to_string(),
            kind: "email_verification",
            token: token.to_string(),
            expires_at,
        });
        Ok(())
    }
}
