//! Error types for authentication operations.

use crate::types::TokenKind;
use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Closed error taxonomy for the authentication subsystem.
///
/// Each kind carries a stable [`code`](AuthError::code) and an HTTP-style
/// [`status`](AuthError::status) class. Security-sensitive checks return the
/// least specific message that still lets a legitimate user recover, so the
/// taxonomy cannot be used to enumerate accounts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Credential Errors
    // ═══════════════════════════════════════════════════════════
    /// Unknown email or wrong password. Deliberately one message for both.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Too many failed attempts; sign-in suspended until the window elapses.
    #[error("account locked")]
    AccountLocked,

    /// The account is banned.
    #[error("account disabled")]
    AccountDisabled,

    /// Policy requires a verified email before sign-in.
    #[error("email not verified")]
    EmailNotVerified,

    /// The address is already verified; nothing to resend.
    #[error("email already verified")]
    AlreadyVerified,

    /// Sign-up conflict on an existing email.
    #[error("user already exists")]
    UserAlreadyExists,

    // ═══════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════
    /// Password failed the strength policy.
    #[error("password too weak: {reason}")]
    WeakPassword {
        /// Which rule the password failed.
        reason: String,
    },

    /// Malformed email address.
    #[error("invalid email address")]
    InvalidEmail,

    // ═══════════════════════════════════════════════════════════
    // Token Errors
    // ═══════════════════════════════════════════════════════════
    /// Token not found, malformed, revoked, or already consumed.
    #[error("invalid {kind} token")]
    InvalidToken {
        /// Which token family failed.
        kind: TokenKind,
    },

    /// Token is past its expiry.
    #[error("{kind} token expired")]
    TokenExpired {
        /// Which token family expired.
        kind: TokenKind,
    },

    /// A token minted by one provider was presented to another provider's
    /// verification path. Rejected explicitly, never silently accepted.
    #[error("token issued by `{actual}` cannot be verified by `{expected}`")]
    ProviderMismatch {
        /// Provider tag the verifier expected.
        expected: String,
        /// Provider tag carried by the token.
        actual: String,
    },

    // ═══════════════════════════════════════════════════════════
    // OAuth Errors
    // ═══════════════════════════════════════════════════════════
    /// The adapter is missing credentials; a configuration problem, not an
    /// upstream rejection.
    #[error("oauth provider `{provider}` is not configured")]
    OAuthMisconfigured {
        /// Adapter name.
        provider: String,
    },

    /// The upstream provider rejected the code exchange.
    #[error("oauth code exchange with `{provider}` failed: {detail}")]
    OAuthExchangeFailed {
        /// Adapter name.
        provider: String,
        /// Upstream detail (safe to surface; never includes secrets).
        detail: String,
    },

    /// The upstream user-info fetch failed.
    #[error("oauth user-info from `{provider}` failed: {detail}")]
    OAuthUserInfoFailed {
        /// Adapter name.
        provider: String,
        /// Upstream detail.
        detail: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Provider / Storage Errors
    // ═══════════════════════════════════════════════════════════
    /// Anything unmapped: storage failures, platform transport errors,
    /// internal invariant breaks. Internal detail is wrapped, not leaked.
    #[error("auth provider error: {0}")]
    Provider(String),
}

impl AuthError {
    /// Wrap a storage or transport failure.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Provider(format!("storage error: {err}"))
    }

    /// Stable machine-readable code for this kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountLocked => "account_locked",
            Self::AccountDisabled => "account_disabled",
            Self::EmailNotVerified => "email_not_verified",
            Self::AlreadyVerified => "already_verified",
            Self::UserAlreadyExists => "user_already_exists",
            Self::WeakPassword { .. } => "weak_password",
            Self::InvalidEmail => "invalid_email",
            Self::InvalidToken { .. } => "invalid_token",
            Self::TokenExpired { .. } => "token_expired",
            Self::ProviderMismatch { .. } => "provider_mismatch",
            Self::OAuthMisconfigured { .. } => "oauth_misconfigured",
            Self::OAuthExchangeFailed { .. } => "oauth_exchange_failed",
            Self::OAuthUserInfoFailed { .. } => "oauth_user_info_failed",
            Self::Provider(_) => "provider_error",
        }
    }

    /// HTTP-style status class for this kind.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::InvalidCredentials
            | Self::InvalidToken { .. }
            | Self::TokenExpired { .. }
            | Self::ProviderMismatch { .. } => 401,
            Self::AccountLocked | Self::AccountDisabled | Self::EmailNotVerified => 403,
            Self::AlreadyVerified | Self::UserAlreadyExists => 409,
            Self::WeakPassword { .. } | Self::InvalidEmail => 400,
            Self::OAuthMisconfigured { .. }
            | Self::OAuthExchangeFailed { .. }
            | Self::OAuthUserInfoFailed { .. } => 502,
            Self::Provider(_) => 500,
        }
    }

    /// Returns `true` if this error is due to invalid user input.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::WeakPassword { .. }
                | Self::InvalidEmail
                | Self::InvalidToken { .. }
                | Self::TokenExpired { .. }
                | Self::UserAlreadyExists
                | Self::AlreadyVerified
        )
    }

    /// Returns `true` if this error indicates an upstream/infrastructure
    /// failure rather than a caller mistake.
    #[must_use]
    pub const fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::OAuthMisconfigured { .. }
                | Self::OAuthExchangeFailed { .. }
                | Self::OAuthUserInfoFailed { .. }
                | Self::Provider(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(AuthError::InvalidCredentials.status(), 401);
        assert_eq!(AuthError::AccountLocked.status(), 403);
        assert_eq!(AuthError::UserAlreadyExists.status(), 409);
        assert_eq!(
            AuthError::InvalidToken { kind: TokenKind::Refresh }.status(),
            401
        );
        assert_eq!(
            AuthError::OAuthMisconfigured { provider: "apple".into() }.status(),
            502
        );
    }

    #[test]
    fn test_credential_errors_share_one_message() {
        // Unknown email and wrong password must be indistinguishable.
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "invalid email or password"
        );
    }

    #[test]
    fn test_token_kind_in_message() {
        let err = AuthError::TokenExpired { kind: TokenKind::Refresh };
        assert_eq!(err.to_string(), "refresh token expired");
        let err = AuthError::InvalidToken { kind: TokenKind::PasswordReset };
        assert_eq!(err.to_string(), "invalid password reset token");
    }

    #[test]
    fn test_storage_wrap_does_not_leak_kind() {
        let err = AuthError::storage("connection refused");
        assert_eq!(err.code(), "provider_error");
        assert_eq!(err.status(), 500);
    }
}
