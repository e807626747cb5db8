//! Core identity and session types.
//!
//! Every provider normalizes its results into the shapes defined here, so
//! callers never see provider-specific fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Unique identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub uuid::Uuid);

impl UserId {
    /// Generate a new random `UserId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    /// Generate a new random `SessionId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Provider Tags
// ═══════════════════════════════════════════════════════════════════════

/// Federated `OAuth` identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OAuthProviderKind {
    /// Google `OAuth`.
    Google,
    /// GitHub `OAuth`.
    GitHub,
    /// Discord `OAuth`.
    Discord,
    /// Apple Sign In.
    Apple,
}

impl OAuthProviderKind {
    /// Get the provider name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
            Self::Discord => "discord",
            Self::Apple => "apple",
        }
    }

    /// Parse provider from string.
    ///
    /// # Errors
    ///
    /// Returns error if the provider string is not recognized.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::GitHub),
            "discord" => Ok(Self::Discord),
            "apple" => Ok(Self::Apple),
            _ => Err(format!("Unknown OAuth provider: {s}")),
        }
    }
}

impl std::fmt::Display for OAuthProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of authentication mechanisms.
///
/// Access tokens are tagged with the provider that *issued* them (`local` or
/// `managed`); sessions additionally record an `oauth:<name>` origin when a
/// federated sign-in created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Self-hosted password-credential provider.
    Local,
    /// External managed identity platform.
    Managed,
    /// Federated `OAuth` sign-in through the named provider.
    OAuth(OAuthProviderKind),
}

impl ProviderKind {
    /// Stable string form used in token claims and session rows.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Managed => "managed",
            Self::OAuth(OAuthProviderKind::Google) => "oauth:google",
            Self::OAuth(OAuthProviderKind::GitHub) => "oauth:github",
            Self::OAuth(OAuthProviderKind::Discord) => "oauth:discord",
            Self::OAuth(OAuthProviderKind::Apple) => "oauth:apple",
        }
    }

    /// Parse a provider tag from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns error if the tag is not recognized.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "local" => Ok(Self::Local),
            "managed" => Ok(Self::Managed),
            _ => match s.strip_prefix("oauth:") {
                Some(name) => OAuthProviderKind::parse(name).map(Self::OAuth),
                None => Err(format!("Unknown provider tag: {s}")),
            },
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of token referenced by a token error or a one-shot token row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// Signed short-lived access token.
    Access,
    /// Opaque refresh token bound to a session row.
    Refresh,
    /// One-shot password-reset token.
    PasswordReset,
    /// One-shot email-verification token.
    EmailVerification,
}

impl TokenKind {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::PasswordReset => "password_reset",
            Self::EmailVerification => "email_verification",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
            Self::PasswordReset => f.write_str("password reset"),
            Self::EmailVerification => f.write_str("email verification"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Core Records
// ═══════════════════════════════════════════════════════════════════════

/// Identity-agnostic user record.
///
/// Owned by whichever provider created it; the credential store is the sole
/// writer. Never deleted implicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User ID.
    pub id: UserId,

    /// Email address (unique, stored lowercase).
    pub email: String,

    /// Display name.
    pub name: Option<String>,

    /// Avatar URL.
    pub avatar_url: Option<String>,

    /// Email verified flag.
    pub email_verified: bool,

    /// Banned flag. Banned accounts are rejected unconditionally.
    pub banned: bool,

    /// Account created timestamp.
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a fresh record for `email`, defaulting the display name to the
    /// local part of the address when none is supplied.
    #[must_use]
    pub fn new(email: &str, name: Option<String>) -> Self {
        let now = Utc::now();
        let email = email.trim().to_lowercase();
        let name = name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| email.split('@').next().map(str::to_string));
        Self {
            id: UserId::new(),
            email,
            name,
            avatar_url: None,
            email_verified: false,
            banned: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Server-tracked session binding a refresh token to a user and an expiry.
///
/// Exactly one session row is current per refresh-token value; refreshing
/// retires the old row and creates a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session ID.
    pub id: SessionId,

    /// Owning user.
    pub user_id: UserId,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,

    /// Active flag. An inactive session's refresh token never authenticates
    /// a new access token.
    pub is_active: bool,

    /// SHA-256 digest of the opaque refresh token. The raw value is never
    /// persisted.
    pub refresh_token_hash: String,

    /// Provider that created the session.
    pub provider: ProviderKind,

    /// Refresh token held at the managed identity platform (managed mode
    /// only), so rotation can be delegated upstream.
    pub platform_refresh_token: Option<String>,
}

/// Access/refresh token pair handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived signed access token.
    pub access_token: String,

    /// Long-lived opaque refresh token.
    pub refresh_token: String,

    /// Access token expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful sign-up, sign-in, or refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    /// The authenticated user.
    pub user: User,

    /// The session row backing the refresh token.
    pub session: Session,

    /// Tokens issued to the caller.
    pub tokens: TokenPair,
}

// ═══════════════════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════════════════

/// Sign-up request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignUp {
    /// Email address.
    pub email: String,

    /// Plaintext password (hashed before storage, never logged).
    pub password: String,

    /// Optional display name.
    pub name: Option<String>,
}

/// Sign-in credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Email address.
    pub email: String,

    /// Plaintext password.
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_generation() {
        let id1 = UserId::new();
        let id2 = UserId::new();

        // IDs should be unique
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_provider_tag_round_trip() {
        for tag in [
            ProviderKind::Local,
            ProviderKind::Managed,
            ProviderKind::OAuth(OAuthProviderKind::Google),
            ProviderKind::OAuth(OAuthProviderKind::GitHub),
            ProviderKind::OAuth(OAuthProviderKind::Discord),
            ProviderKind::OAuth(OAuthProviderKind::Apple),
        ] {
            assert_eq!(ProviderKind::parse(tag.as_str()), Ok(tag));
        }
        assert!(ProviderKind::parse("oauth:myspace").is_err());
        assert!(ProviderKind::parse("saml").is_err());
    }

    #[test]
    fn test_user_defaults_display_name_to_local_part() {
        let user = User::new("Alice@Example.com", None);
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.name.as_deref(), Some("alice"));

        let named = User::new("bob@example.com", Some("Bob T.".to_string()));
        assert_eq!(named.name.as_deref(), Some("Bob T."));

        // Whitespace-only names fall back too
        let blank = User::new("carol@example.com", Some("   ".to_string()));
        assert_eq!(blank.name.as_deref(), Some("carol"));
    }
}
