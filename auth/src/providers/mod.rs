//! Authentication providers.
//!
//! Every provider implements one capability-set contract, [`AuthProvider`],
//! so the rest of the system never needs to know which mechanism
//! authenticated a given user. Callers depend on this trait plus the
//! normalized `User`/`Session` shapes — never on provider-specific fields.

use crate::error::Result;
use crate::types::{AuthSession, Credentials, SignUp, User, UserId};

pub mod local;
pub mod managed;

pub use local::LocalAuthProvider;
pub use managed::ManagedAuthProvider;

/// The provider capability set.
///
/// Security-sensitive methods follow the error policy of the taxonomy:
/// unknown email and wrong password are one message, reset-token issuance
/// is silent about account existence, and sign-out is idempotent.
pub trait AuthProvider: Send + Sync {
    /// Register a new credential and issue a first session.
    ///
    /// # Errors
    ///
    /// Returns a validation error for weak passwords or malformed emails,
    /// `UserAlreadyExists` on a duplicate email.
    fn sign_up(&self, request: &SignUp) -> impl Future<Output = Result<AuthSession>> + Send;

    /// Authenticate a password credential and issue a session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` for unknown email *and* wrong password,
    /// `AccountLocked` while a lockout window is in effect,
    /// `AccountDisabled` for banned accounts, `EmailNotVerified` when
    /// policy gates on verification.
    fn sign_in(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<AuthSession>> + Send;

    /// Revoke the session holding this refresh token. Idempotent: an
    /// already-invalid or malformed token is not an error.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error only.
    fn sign_out(&self, refresh_token: &str) -> impl Future<Output = Result<()>> + Send;

    /// Verify an access token and return its user.
    ///
    /// Stateless except for one storage round trip confirming user
    /// existence and ban status.
    ///
    /// # Errors
    ///
    /// Returns token errors (including `ProviderMismatch` for tokens minted
    /// by another provider) or `AccountDisabled`.
    fn verify_token(&self, access_token: &str) -> impl Future<Output = Result<User>> + Send;

    /// Rotate a refresh token: retire the old session, issue a new
    /// session + token pair.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for unknown or retired tokens, `TokenExpired`
    /// past expiry (marking the session inactive as a side effect),
    /// `AccountDisabled` for banned owners.
    fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<AuthSession>> + Send;

    /// Issue a password-reset token. Never reveals whether the email
    /// exists: unknown addresses return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error only.
    fn reset_password_request(&self, email: &str) -> impl Future<Output = Result<()>> + Send;

    /// Consume a reset token and replace the password, invalidating every
    /// session for that user.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for unknown/expired/already-consumed tokens
    /// and a validation error for weak replacement passwords.
    fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Replace the password given the current one (current-password flow,
    /// distinct from the reset-token flow).
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` for a wrong current password and a
    /// validation error for weak replacements.
    fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Consume an email-verification token and mark the address verified.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for unknown/expired/already-consumed tokens.
    fn verify_email(&self, token: &str) -> impl Future<Output = Result<User>> + Send;

    /// Resend the verification email. Silent for unknown addresses;
    /// explicit `AlreadyVerified` for verified ones.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyVerified` or a delivery/storage error.
    fn resend_verification(&self, email: &str) -> impl Future<Output = Result<()>> + Send;

    /// Get a user by id.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn get_user(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Get a user by email.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn get_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Update mutable user fields.
    ///
    /// # Errors
    ///
    /// Returns a validation or storage error.
    fn update_user(&self, user: &User) -> impl Future<Output = Result<User>> + Send;

    /// Delete a user; credentials and sessions cascade.
    ///
    /// # Errors
    ///
    /// Returns a wrapped storage error.
    fn delete_user(&self, id: UserId) -> impl Future<Output = Result<()>> + Send;
}
