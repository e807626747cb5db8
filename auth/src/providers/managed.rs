//! Managed-identity provider.
//!
//! Delegates the credential lifecycle to an external identity platform and
//! maps the platform's error strings onto the shared taxonomy. After every
//! successful operation the platform's user is idempotently mirrored into
//! the local user table (keyed by platform user id), so the rest of the
//! system treats every provider's users uniformly; email lookups are served
//! from the mirror, never the platform API.
//!
//! The provider mints its own access/refresh pair (tagged `managed`) after
//! delegation and keeps the platform refresh token on the session row, so
//! rotation is delegated upstream while the shared session invariants hold.

use super::AuthProvider;
use crate::config::{AuthConfig, LocalPolicy};
use crate::error::{AuthError, Result};
use crate::password::validate_password_strength;
use crate::platform::{IdentityPlatform, PlatformError, PlatformSession, PlatformUser};
use crate::store::{CredentialStore, NewSession};
use crate::token::{TokenIssuer, new_refresh_token, token_digest};
use crate::types::{
    AuthSession, Credentials, OAuthProviderKind, ProviderKind, SignUp, TokenKind, TokenPair, User,
    UserId,
};
use chrono::Utc;
use tracing::info;

/// Managed-identity provider.
#[derive(Clone)]
pub struct ManagedAuthProvider<S, P> {
    store: S,
    platform: P,
    issuer: TokenIssuer,
    policy: LocalPolicy,
}

impl<S: CredentialStore, P: IdentityPlatform> ManagedAuthProvider<S, P> {
    /// Build the provider from configuration.
    #[must_use]
    pub fn new(store: S, platform: P, config: &AuthConfig) -> Self {
        Self {
            store,
            platform,
            issuer: TokenIssuer::new(&config.jwt_secret, config.policy.access_ttl_secs),
            policy: config.policy,
        }
    }

    /// Mirror the platform's user into the local table (idempotent upsert
    /// by platform user id).
    async fn mirror(&self, platform_user: &PlatformUser) -> Result<User> {
        let mut user = User::new(&platform_user.email, platform_user.name.clone());
        user.avatar_url = platform_user.avatar_url.clone();
        user.email_verified = platform_user.email_confirmed;
        self.store.upsert_platform_user(&platform_user.id, &user).await
    }

    /// Mirror, then open a local session holding the platform refresh
    /// token, and mint a `managed`-tagged token pair.
    async fn open_session(&self, platform_session: PlatformSession) -> Result<AuthSession> {
        let user = self.mirror(&platform_session.user).await?;

        // The platform withholds tokens when the email still needs
        // confirmation; there is no session to open yet.
        let Some(platform_refresh) = platform_session.refresh_token else {
            return Err(AuthError::EmailNotVerified);
        };

        let refresh_token = new_refresh_token();
        let session = self
            .store
            .create_session(&NewSession {
                user_id: user.id,
                refresh_token_hash: token_digest(&refresh_token),
                provider: ProviderKind::Managed,
                expires_at: Utc::now() + self.policy.session_ttl(),
                platform_refresh_token: Some(platform_refresh),
            })
            .await?;

        let (access_token, expires_at) =
            self.issuer.issue_access_token(&user, ProviderKind::Managed)?;

        Ok(AuthSession {
            user,
            session,
            tokens: TokenPair { access_token, refresh_token, expires_at },
        })
    }

    /// Build the platform's authorization URL for a federated provider.
    ///
    /// # Errors
    ///
    /// Returns a provider error if URL construction fails.
    pub fn oauth_url(
        &self,
        provider: OAuthProviderKind,
        redirect_to: &str,
        state: &str,
    ) -> Result<String> {
        self.platform
            .authorize_url(provider, redirect_to, state)
            .map_err(|e| map_platform_error(e, TokenKind::Access))
    }

    /// Complete a federated callback by exchanging the code at the
    /// platform.
    ///
    /// # Errors
    ///
    /// Returns the mapped platform rejection.
    pub async fn handle_oauth_callback(&self, code: &str) -> Result<AuthSession> {
        let platform_session = self
            .platform
            .exchange_code(code)
            .await
            .map_err(|e| map_platform_error(e, TokenKind::Access))?;
        self.open_session(platform_session).await
    }
}

impl<S: CredentialStore, P: IdentityPlatform> AuthProvider for ManagedAuthProvider<S, P> {
    async fn sign_up(&self, request: &SignUp) -> Result<AuthSession> {
        crate::utils::validate_email(&request.email)?;
        validate_password_strength(&request.password)?;

        let platform_session = self
            .platform
            .sign_up(&request.email, &request.password)
            .await
            .map_err(|e| map_platform_error(e, TokenKind::Access))?;

        info!(platform_user_id = %platform_session.user.id, "user signed up at platform");
        self.open_session(platform_session).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession> {
        let platform_session = self
            .platform
            .sign_in(&credentials.email, &credentials.password)
            .await
            .map_err(|e| map_platform_error(e, TokenKind::Access))?;

        self.open_session(platform_session).await
    }

    async fn sign_out(&self, refresh_token: &str) -> Result<()> {
        // Local revocation only; the platform session dies with its
        // refresh token, which is never handed out again.
        self.store
            .deactivate_session_by_refresh_hash(&token_digest(refresh_token))
            .await
    }

    async fn verify_token(&self, access_token: &str) -> Result<User> {
        let claims = self
            .issuer
            .verify_access_token(access_token, ProviderKind::Managed)?;
        let user = self
            .store
            .get_user(claims.user_id()?)
            .await?
            .ok_or(AuthError::InvalidToken { kind: TokenKind::Access })?;

        if user.banned {
            return Err(AuthError::AccountDisabled);
        }
        Ok(user)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        let session = self
            .store
            .get_session_by_refresh_hash(&token_digest(refresh_token))
            .await?
            .ok_or(AuthError::InvalidToken { kind: TokenKind::Refresh })?;

        if !session.is_active {
            return Err(AuthError::InvalidToken { kind: TokenKind::Refresh });
        }

        if session.expires_at <= Utc::now() {
            self.store.deactivate_session(session.id).await?;
            return Err(AuthError::TokenExpired { kind: TokenKind::Refresh });
        }

        let platform_refresh = session.platform_refresh_token.clone().ok_or_else(|| {
            AuthError::Provider("managed session is missing its platform refresh token".to_string())
        })?;

        let platform_session = self
            .platform
            .refresh(&platform_refresh)
            .await
            .map_err(|e| map_platform_error(e, TokenKind::Refresh))?;

        let user = self.mirror(&platform_session.user).await?;
        if user.banned {
            return Err(AuthError::AccountDisabled);
        }

        let next_refresh = new_refresh_token();
        let rotated = self
            .store
            .rotate_session(
                session.id,
                &NewSession {
                    user_id: user.id,
                    refresh_token_hash: token_digest(&next_refresh),
                    provider: ProviderKind::Managed,
                    expires_at: Utc::now() + self.policy.session_ttl(),
                    platform_refresh_token: platform_session
                        .refresh_token
                        .or(Some(platform_refresh)),
                },
            )
            .await?;

        let (access_token, expires_at) =
            self.issuer.issue_access_token(&user, ProviderKind::Managed)?;

        Ok(AuthSession {
            user,
            session: rotated,
            tokens: TokenPair { access_token, refresh_token: next_refresh, expires_at },
        })
    }

    async fn reset_password_request(&self, email: &str) -> Result<()> {
        match self.platform.recover(email).await {
            Ok(()) => Ok(()),
            // Silent for unknown addresses, like every reset path.
            Err(PlatformError::Rejected { message })
                if message.to_lowercase().contains("not found") =>
            {
                Ok(())
            }
            Err(e) => Err(map_platform_error(e, TokenKind::PasswordReset)),
        }
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        validate_password_strength(new_password)?;

        let platform_session = self
            .platform
            .verify("recovery", token)
            .await
            .map_err(|e| map_platform_error(e, TokenKind::PasswordReset))?;

        let access_token = platform_session.access_token.clone().ok_or_else(|| {
            AuthError::Provider("platform returned no session for recovery token".to_string())
        })?;

        self.platform
            .update_password(&access_token, new_password)
            .await
            .map_err(|e| map_platform_error(e, TokenKind::PasswordReset))?;

        // Force re-login everywhere, matching the local provider.
        let user = self.mirror(&platform_session.user).await?;
        self.store.revoke_user_sessions(user.id).await?;

        info!(user_id = %user.id, "password reset via platform; all sessions revoked");
        Ok(())
    }

    async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        validate_password_strength(new_password)?;

        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        // The platform is the credential authority: prove the current
        // password by signing in.
        let platform_session = self
            .platform
            .sign_in(&user.email, current_password)
            .await
            .map_err(|e| map_platform_error(e, TokenKind::Access))?;

        let access_token = platform_session.access_token.ok_or_else(|| {
            AuthError::Provider("platform returned no session for password change".to_string())
        })?;

        self.platform
            .update_password(&access_token, new_password)
            .await
            .map_err(|e| map_platform_error(e, TokenKind::Access))
    }

    async fn verify_email(&self, token: &str) -> Result<User> {
        let platform_session = self
            .platform
            .verify("signup", token)
            .await
            .map_err(|e| map_platform_error(e, TokenKind::EmailVerification))?;

        self.mirror(&platform_session.user).await
    }

    async fn resend_verification(&self, email: &str) -> Result<()> {
        match self.platform.resend_verification(email).await {
            Ok(()) => Ok(()),
            Err(PlatformError::Rejected { message })
                if message.to_lowercase().contains("not found") =>
            {
                Ok(())
            }
            Err(e) => Err(map_platform_error(e, TokenKind::EmailVerification)),
        }
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.store.get_user(id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        // Served from the local mirror; the platform has no email lookup.
        self.store.get_user_by_email(email).await
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        crate::utils::validate_email(&user.email)?;
        self.store.update_user(user).await
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        self.store.delete_user(id).await
    }
}

/// Map a platform error string onto the shared taxonomy.
///
/// `token_kind` names the token family the operation concerns, so "token
/// expired" maps to the right error for refresh, reset, and verification
/// flows alike.
fn map_platform_error(err: PlatformError, token_kind: TokenKind) -> AuthError {
    match err {
        PlatformError::Rejected { message } => {
            let lower = message.to_lowercase();
            if lower.contains("already registered") {
                AuthError::UserAlreadyExists
            } else if lower.contains("invalid login credentials") {
                AuthError::InvalidCredentials
            } else if lower.contains("email not confirmed") {
                AuthError::EmailNotVerified
            } else if lower.contains("already confirmed") || lower.contains("already verified") {
                AuthError::AlreadyVerified
            } else if lower.contains("banned") || lower.contains("user is disabled") {
                AuthError::AccountDisabled
            } else if lower.contains("expired") {
                AuthError::TokenExpired { kind: token_kind }
            } else if lower.contains("invalid token")
                || lower.contains("invalid refresh token")
                || lower.contains("token not found")
                || lower.contains("otp")
            {
                AuthError::InvalidToken { kind: token_kind }
            } else {
                AuthError::Provider(format!("platform error: {message}"))
            }
        }
        PlatformError::Transport(detail) => {
            AuthError::Provider(format!("platform transport error: {detail}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(message: &str) -> PlatformError {
        PlatformError::Rejected { message: message.to_string() }
    }

    #[test]
    fn test_platform_error_string_mapping() {
        assert_eq!(
            map_platform_error(rejected("User already registered"), TokenKind::Access),
            AuthError::UserAlreadyExists
        );
        assert_eq!(
            map_platform_error(rejected("Invalid login credentials"), TokenKind::Access),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            map_platform_error(rejected("Email not confirmed"), TokenKind::Access),
            AuthError::EmailNotVerified
        );
        assert_eq!(
            map_platform_error(rejected("Token expired"), TokenKind::Refresh),
            AuthError::TokenExpired { kind: TokenKind::Refresh }
        );
        assert_eq!(
            map_platform_error(rejected("Invalid token"), TokenKind::PasswordReset),
            AuthError::InvalidToken { kind: TokenKind::PasswordReset }
        );
    }

    #[test]
    fn test_unmapped_platform_error_is_wrapped() {
        let err = map_platform_error(rejected("quota exceeded"), TokenKind::Access);
        assert!(matches!(err, AuthError::Provider(_)));

        let err = map_platform_error(
            PlatformError::Transport("connection refused".to_string()),
            TokenKind::Access,
        );
        assert!(matches!(err, AuthError::Provider(_)));
    }
}
