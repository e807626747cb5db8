//! Local password-credential provider.
//!
//! Implements sign-up, sign-in, sign-out, refresh, password reset, email
//! verification, and the lockout policy over the credential store, password
//! hasher, and token issuer.
//!
//! Account states derive from the user row plus the local credential:
//! `unverified`, `active`, `locked`, `banned`. Sign-in walks the checks in
//! a fixed order so failures cannot be used to probe accounts: a banned
//! account is rejected before anything else, lockout is checked before the
//! password, and the verification gate applies only *after* the password
//! verified.

use super::AuthProvider;
use crate::config::{AuthConfig, LocalPolicy};
use crate::error::{AuthError, Result};
use crate::mailer::Mailer;
use crate::oauth::OAuthUserInfo;
use crate::password::{PasswordHasher, validate_password_strength};
use crate::store::{CredentialStore, NewSession, OneShotToken};
use crate::token::{TokenIssuer, new_one_shot_token, new_refresh_token, token_digest};
use crate::types::{
    AuthSession, Credentials, OAuthProviderKind, ProviderKind, SignUp, TokenKind, TokenPair, User,
    UserId,
};
use crate::utils::validate_email;
use chrono::Utc;
use tracing::{info, warn};

/// Local password-credential provider.
#[derive(Clone)]
pub struct LocalAuthProvider<S, M> {
    store: S,
    mailer: M,
    hasher: PasswordHasher,
    issuer: TokenIssuer,
    policy: LocalPolicy,
}

impl<S: CredentialStore, M: Mailer> LocalAuthProvider<S, M> {
    /// Build the provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the Argon2 parameters are out of range.
    pub fn new(store: S, mailer: M, config: &AuthConfig) -> Result<Self> {
        Ok(Self {
            store,
            mailer,
            hasher: PasswordHasher::new(config.password)?,
            issuer: TokenIssuer::new(&config.jwt_secret, config.policy.access_ttl_secs),
            policy: config.policy,
        })
    }

    /// Open a session for `user` and mint a token pair.
    ///
    /// `origin` records how the session came to be (`local` or
    /// `oauth:<name>`); the access token is always tagged `local`, the
    /// issuing verification path.
    async fn open_session(&self, user: &User, origin: ProviderKind) -> Result<AuthSession> {
        let refresh_token = new_refresh_token();
        let session = self
            .store
            .create_session(&NewSession {
                user_id: user.id,
                refresh_token_hash: token_digest(&refresh_token),
                provider: origin,
                expires_at: Utc::now() + self.policy.session_ttl(),
                platform_refresh_token: None,
            })
            .await?;

        let (access_token, expires_at) =
            self.issuer.issue_access_token(user, ProviderKind::Local)?;

        Ok(AuthSession {
            user: user.clone(),
            session,
            tokens: TokenPair { access_token, refresh_token, expires_at },
        })
    }

    /// Issue and deliver an email-verification token.
    async fn send_verification_token(&self, user: &User) -> Result<()> {
        let raw = new_one_shot_token();
        let expires_at = Utc::now() + self.policy.verification_token_ttl();
        self.store
            .create_one_shot_token(&OneShotToken {
                user_id: user.id,
                purpose: TokenKind::EmailVerification,
                token_hash: token_digest(&raw),
                expires_at,
                created_at: Utc::now(),
            })
            .await?;
        self.mailer
            .send_email_verification(&user.email, &raw, expires_at)
            .await
    }

    /// Federated sign-in: merge the normalized identity into the user
    /// table (first login creates the row) and open a session recording
    /// the `OAuth` origin.
    ///
    /// # Errors
    ///
    /// Returns `AccountDisabled` for banned accounts or a storage error.
    pub async fn sign_in_with_oauth(
        &self,
        info: &OAuthUserInfo,
        origin: OAuthProviderKind,
    ) -> Result<AuthSession> {
        validate_email(&info.email)?;

        let user = match self.store.get_user_by_email(&info.email).await? {
            Some(mut user) => {
                // Merge: the provider can vouch for the email and fill
                // profile gaps, never overwrite local edits.
                let mut changed = false;
                if info.email_verified && !user.email_verified {
                    user.email_verified = true;
                    changed = true;
                }
                if user.name.is_none() && info.name.is_some() {
                    user.name = info.name.clone();
                    changed = true;
                }
                if user.avatar_url.is_none() && info.avatar_url.is_some() {
                    user.avatar_url = info.avatar_url.clone();
                    changed = true;
                }
                if changed {
                    self.store.update_user(&user).await?
                } else {
                    user
                }
            }
            None => {
                let mut user = User::new(&info.email, info.name.clone());
                user.avatar_url = info.avatar_url.clone();
                user.email_verified = info.email_verified;
                let user = self.store.create_user(&user).await?;
                info!(user_id = %user.id, provider = %origin, "user created via oauth");
                user
            }
        };

        if user.banned {
            return Err(AuthError::AccountDisabled);
        }

        self.open_session(&user, ProviderKind::OAuth(origin)).await
    }
}

impl<S: CredentialStore, M: Mailer> AuthProvider for LocalAuthProvider<S, M> {
    async fn sign_up(&self, request: &SignUp) -> Result<AuthSession> {
        validate_email(&request.email)?;
        validate_password_strength(&request.password)?;

        let user = User::new(&request.email, request.name.clone());
        let password_hash = self.hasher.hash(&request.password)?;

        // The unique constraint is the duplicate check; insert + credential
        // commit together or not at all.
        let user = self
            .store
            .create_user_with_credential(&user, &password_hash)
            .await?;

        info!(user_id = %user.id, "user signed up");

        // Best effort: sign-up must not fail on a mail hiccup.
        if let Err(e) = self.send_verification_token(&user).await {
            warn!(user_id = %user.id, "failed to send verification email: {e}");
        }

        self.open_session(&user, ProviderKind::Local).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession> {
        let Some(user) = self.store.get_user_by_email(&credentials.email).await? else {
            // Same message as a wrong password: no existence leakage.
            return Err(AuthError::InvalidCredentials);
        };

        if user.banned {
            return Err(AuthError::AccountDisabled);
        }

        let Some(credential) = self.store.get_credential(user.id).await? else {
            // OAuth-only account; indistinguishable from a bad password.
            return Err(AuthError::InvalidCredentials);
        };

        let now = Utc::now();
        if credential.is_locked(now) {
            return Err(AuthError::AccountLocked);
        }

        if !self
            .hasher
            .verify(&credential.password_hash, &credentials.password)?
        {
            let updated = self
                .store
                .record_login_failure(
                    user.id,
                    self.policy.lockout_threshold,
                    self.policy.lockout_duration(),
                )
                .await?;
            if updated.is_locked(now) {
                warn!(user_id = %user.id, "account locked after repeated sign-in failures");
            }
            return Err(AuthError::InvalidCredentials);
        }

        // Only after the password verified, so this cannot probe accounts.
        if self.policy.require_email_verification && !user.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        if credential.failed_attempts > 0 || credential.locked_until.is_some() {
            self.store.clear_login_failures(user.id).await?;
        }
        self.open_session(&user, ProviderKind::Local).await
    }

    async fn sign_out(&self, refresh_token: &str) -> Result<()> {
        // Idempotent: unknown or malformed tokens are a no-op.
        self.store
            .deactivate_session_by_refresh_hash(&token_digest(refresh_token))
            .await
    }

    async fn verify_token(&self, access_token: &str) -> Result<User> {
        let claims = self
            .issuer
            .verify_access_token(access_token, ProviderKind::Local)?;
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

        // An inactive session's refresh token never authenticates again.
        if !session.is_active {
            return Err(AuthError::InvalidToken { kind: TokenKind::Refresh });
        }

        if session.expires_at <= Utc::now() {
            self.store.deactivate_session(session.id).await?;
            return Err(AuthError::TokenExpired { kind: TokenKind::Refresh });
        }

        let user = self
            .store
            .get_user(session.user_id)
            .await?
            .ok_or(AuthError::InvalidToken { kind: TokenKind::Refresh })?;

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
                    provider: session.provider,
                    expires_at: Utc::now() + self.policy.session_ttl(),
                    platform_refresh_token: None,
                },
            )
            .await?;

        let (access_token, expires_at) =
            self.issuer.issue_access_token(&user, ProviderKind::Local)?;

        Ok(AuthSession {
            user,
            session: rotated,
            tokens: TokenPair { access_token, refresh_token: next_refresh, expires_at },
        })
    }

    async fn reset_password_request(&self, email: &str) -> Result<()> {
        // Always succeeds: never reveals whether the email exists.
        let Some(user) = self.store.get_user_by_email(email).await? else {
            return Ok(());
        };
        if self.store.get_credential(user.id).await?.is_none() {
            return Ok(());
        }

        let raw = new_one_shot_token();
        let expires_at = Utc::now() + self.policy.reset_token_ttl();
        self.store
            .create_one_shot_token(&OneShotToken {
                user_id: user.id,
                purpose: TokenKind::PasswordReset,
                token_hash: token_digest(&raw),
                expires_at,
                created_at: Utc::now(),
            })
            .await?;

        if let Err(e) = self
            .mailer
            .send_password_reset(&user.email, &raw, expires_at)
            .await
        {
            // Still Ok to the caller; a delivery failure must not become
            // an account-existence oracle.
            tracing::error!(user_id = %user.id, "failed to send reset email: {e}");
        }
        Ok(())
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        // Validate before consuming so a weak password does not burn the
        // one-shot token.
        validate_password_strength(new_password)?;

        let consumed = self
            .store
            .consume_one_shot_token(TokenKind::PasswordReset, &token_digest(token))
            .await?
            .ok_or(AuthError::InvalidToken { kind: TokenKind::PasswordReset })?;

        let password_hash = self.hasher.hash(new_password)?;
        self.store
            .set_password_hash(consumed.user_id, &password_hash, true)
            .await?;

        info!(user_id = %consumed.user_id, "password reset; all sessions revoked");
        Ok(())
    }

    async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        validate_password_strength(new_password)?;

        let credential = self
            .store
            .get_credential(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self
            .hasher
            .verify(&credential.password_hash, current_password)?
        {
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = self.hasher.hash(new_password)?;
        self.store
            .set_password_hash(user_id, &password_hash, false)
            .await
    }

    async fn verify_email(&self, token: &str) -> Result<User> {
        let consumed = self
            .store
            .consume_one_shot_token(TokenKind::EmailVerification, &token_digest(token))
            .await?
            .ok_or(AuthError::InvalidToken { kind: TokenKind::EmailVerification })?;

        self.store.mark_email_verified(consumed.user_id).await?;
        self.store
            .get_user(consumed.user_id)
            .await?
            .ok_or(AuthError::InvalidToken { kind: TokenKind::EmailVerification })
    }

    async fn resend_verification(&self, email: &str) -> Result<()> {
        // Silent for unknown addresses (no enumeration).
        let Some(user) = self.store.get_user_by_email(email).await? else {
            return Ok(());
        };

        if user.email_verified {
            return Err(AuthError::AlreadyVerified);
        }

        self.send_verification_token(&user).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.store.get_user(id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.store.get_user_by_email(email).await
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        validate_email(&user.email)?;
        self.store.update_user(user).await
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        self.store.delete_user(id).await
    }
}
