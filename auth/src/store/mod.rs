//! Credential store.
//!
//! Persistent relational storage for users, local credentials, sessions, and
//! one-shot tokens. The store is the single source of truth shared by every
//! provider; there is no in-process session cache that must stay consistent
//! across instances.
//!
//! Multi-statement sequences (sign-up, session rotation, password reset,
//! user deletion) are implemented *inside* store methods so each one is
//! transactional: a partial sign-up or a refreshed-but-not-rotated session
//! can never be observed. Likewise the failed-login counter is a single
//! atomic update, and one-shot token consumption is a single
//! delete-returning statement.

use crate::config::PersistedSettings;
use crate::error::Result;
use crate::types::{ProviderKind, Session, SessionId, TokenKind, User, UserId};
use chrono::{DateTime, Duration, Utc};

pub mod postgres;

pub use postgres::PostgresCredentialStore;

/// Local password credential, 1:1 with a user.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCredential {
    /// Owning user.
    pub user_id: UserId,

    /// Argon2id hash in PHC format.
    pub password_hash: String,

    /// Consecutive failed sign-in attempts.
    pub failed_attempts: i32,

    /// When set and in the future, sign-in is suspended.
    pub locked_until: Option<DateTime<Utc>>,

    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl LocalCredential {
    /// Whether the lockout window is currently in effect.
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// One-shot, single-purpose, time-boxed token row.
///
/// Consumed exactly once; a second use fails, never silently no-ops.
#[derive(Debug, Clone, PartialEq)]
pub struct OneShotToken {
    /// Owning user.
    pub user_id: UserId,

    /// Purpose (password reset or email verification).
    pub purpose: TokenKind,

    /// SHA-256 digest of the token value; the raw value is only ever in the
    /// email sent to the user.
    pub token_hash: String,

    /// Expiry timestamp.
    pub expires_at: DateTime<Utc>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a session row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    /// Owning user.
    pub user_id: UserId,

    /// SHA-256 digest of the refresh token.
    pub refresh_token_hash: String,

    /// Provider that created the session.
    pub provider: ProviderKind,

    /// Expiry timestamp.
    pub expires_at: DateTime<Utc>,

    /// Platform-side refresh token (managed mode only).
    pub platform_refresh_token: Option<String>,
}

/// Persistent storage contract shared by every provider.
///
/// Implementations must be cheap to clone (connection-pool handles).
pub trait CredentialStore: Clone + Send + Sync {
    // ═══════════════════════════════════════════════════════════════════
    // Users
    // ═══════════════════════════════════════════════════════════════════

    /// Insert a user row without a local credential (OAuth first login,
    /// managed mirror).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserAlreadyExists` on an email conflict, or a
    /// wrapped storage error.
    fn create_user(&self, user: &User) -> impl Future<Output = Result<User>> + Send;

    /// Insert a user and its local credential in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserAlreadyExists` on an email conflict; nothing
    /// is committed on any failure.
    fn create_user_with_credential(
        &self,
        user: &User,
        password_hash: &str,
    ) -> impl Future<Output = Result<User>> + Send;

    /// Get user by id.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn get_user(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Get user by email (lowercased before lookup).
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn get_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Update mutable user fields (name, avatar, verified/banned flags).
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error if the row is missing.
    fn update_user(&self, user: &User) -> impl Future<Output = Result<User>> + Send;

    /// Delete a user; credentials, sessions, and outstanding one-shot
    /// tokens go with it in one transaction.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn delete_user(&self, id: UserId) -> impl Future<Output = Result<()>> + Send;

    /// Idempotently upsert a user mirrored from the managed identity
    /// platform, keyed by the platform's user id.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn upsert_platform_user(
        &self,
        platform_user_id: &str,
        user: &User,
    ) -> impl Future<Output = Result<User>> + Send;

    // ═══════════════════════════════════════════════════════════════════
    // Local Credentials
    // ═══════════════════════════════════════════════════════════════════

    /// Get the local credential for a user, if one exists.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn get_credential(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<LocalCredential>>> + Send;

    /// Replace the password hash; optionally revoke every session for the
    /// user in the same transaction (password reset forces re-login
    /// everywhere).
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error; nothing is committed on failure.
    fn set_password_hash(
        &self,
        user_id: UserId,
        password_hash: &str,
        revoke_sessions: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Record one failed sign-in attempt as a single atomic update: the
    /// counter increments, and `locked_until` is set once the counter
    /// reaches `threshold`. Safe under concurrent bad-password attempts.
    ///
    /// Returns the credential as of after the update.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn record_login_failure(
        &self,
        user_id: UserId,
        threshold: i32,
        lockout: Duration,
    ) -> impl Future<Output = Result<LocalCredential>> + Send;

    /// Reset the failed-attempt counter and clear any lockout.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn clear_login_failures(&self, user_id: UserId) -> impl Future<Output = Result<()>> + Send;

    /// Mark the user's email verified.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn mark_email_verified(&self, user_id: UserId) -> impl Future<Output = Result<()>> + Send;

    // ═══════════════════════════════════════════════════════════════════
    // Sessions
    // ═══════════════════════════════════════════════════════════════════

    /// Insert a session row.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn create_session(
        &self,
        session: &NewSession,
    ) -> impl Future<Output = Result<Session>> + Send;

    /// Look up a session by the digest of its refresh token.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn get_session_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
    ) -> impl Future<Output = Result<Option<Session>>> + Send;

    /// Atomically retire `retired` and insert `next` (rotation, not reuse).
    ///
    /// The retired row is deactivated only if it is still active, so two
    /// concurrent refreshes of the same token cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken { kind: Refresh }` if the retired
    /// session was already rotated or revoked; nothing is committed on any
    /// failure.
    fn rotate_session(
        &self,
        retired: SessionId,
        next: &NewSession,
    ) -> impl Future<Output = Result<Session>> + Send;

    /// Mark a session inactive.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn deactivate_session(&self, id: SessionId) -> impl Future<Output = Result<()>> + Send;

    /// Mark the session holding this refresh-token digest inactive, if it
    /// exists. Missing rows are not an error (sign-out is idempotent).
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn deactivate_session_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Mark every session for a user inactive. Returns how many were
    /// revoked.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn revoke_user_sessions(&self, user_id: UserId) -> impl Future<Output = Result<u64>> + Send;

    // ═══════════════════════════════════════════════════════════════════
    // One-Shot Tokens
    // ═══════════════════════════════════════════════════════════════════

    /// Insert a one-shot token row.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn create_one_shot_token(
        &self,
        token: &OneShotToken,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomically consume a one-shot token: a single delete-returning
    /// statement, so exactly one of any number of concurrent consumers
    /// succeeds. Expired rows are removed and reported as `None`.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn consume_one_shot_token(
        &self,
        purpose: TokenKind,
        token_hash: &str,
    ) -> impl Future<Output = Result<Option<OneShotToken>>> + Send;

    // ═══════════════════════════════════════════════════════════════════
    // Settings
    // ═══════════════════════════════════════════════════════════════════

    /// Load the persisted provider-selection/policy row, if any.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn load_settings(&self) -> impl Future<Output = Result<Option<PersistedSettings>>> + Send;

    /// Persist the provider-selection/policy row (singleton upsert).
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn save_settings(
        &self,
        settings: &PersistedSettings,
    ) -> impl Future<Output = Result<()>> + Send;
}
