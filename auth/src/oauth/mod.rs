//! Federated `OAuth` sign-in adapters.
//!
//! One adapter per identity provider, each independent and stateless except
//! for its credentials. Adapters normalize provider responses into
//! [`OAuthUserInfo`] so the rest of the system never sees provider-specific
//! fields.
//!
//! Dispatch is a closed set of tagged variants ([`OAuthAdapter`]) rather
//! than trait objects; the facade matches once at the entry point.
//!
//! Authorization URLs always embed the caller-supplied opaque `state` for
//! CSRF binding. The caller owns persisting and verifying that state; see
//! `AuthService::oauth_authorization_url`.

use crate::config::AuthConfig;
use crate::error::Result;
use crate::types::OAuthProviderKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod apple;
pub mod discord;
pub mod github;
pub mod google;

pub use apple::AppleOAuth;
pub use discord::DiscordOAuth;
pub use github::GitHubOAuth;
pub use google::GoogleOAuth;

/// Token response from a provider's code exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthTokens {
    /// Access token for provider API requests.
    pub access_token: String,

    /// Refresh token (if the provider returned one).
    pub refresh_token: Option<String>,

    /// Identity token (OIDC providers; required for Apple user info).
    pub id_token: Option<String>,

    /// Access token expiration (if provided).
    pub expires_at: Option<DateTime<Utc>>,
}

/// Normalized identity returned by every adapter.
///
/// Transient: merged into a `User` on first login, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthUserInfo {
    /// Provider-side user id (stable, unique per provider).
    pub provider_user_id: String,

    /// Email address.
    pub email: String,

    /// Whether the provider vouches for the email.
    pub email_verified: bool,

    /// Display name.
    pub name: Option<String>,

    /// Avatar URL.
    pub avatar_url: Option<String>,
}

/// Closed set of configured adapters.
#[derive(Clone)]
pub enum OAuthAdapter {
    /// Google `OAuth`.
    Google(GoogleOAuth),
    /// GitHub `OAuth`.
    GitHub(GitHubOAuth),
    /// Discord `OAuth`.
    Discord(DiscordOAuth),
    /// Apple Sign In.
    Apple(AppleOAuth),
}

impl OAuthAdapter {
    /// Which provider this adapter talks to.
    #[must_use]
    pub const fn kind(&self) -> OAuthProviderKind {
        match self {
            Self::Google(_) => OAuthProviderKind::Google,
            Self::GitHub(_) => OAuthProviderKind::GitHub,
            Self::Discord(_) => OAuthProviderKind::Discord,
            Self::Apple(_) => OAuthProviderKind::Apple,
        }
    }

    /// Whether the adapter has complete credentials.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        match self {
            Self::Google(p) => p.is_configured(),
            Self::GitHub(p) => p.is_configured(),
            Self::Discord(p) => p.is_configured(),
            Self::Apple(p) => p.is_configured(),
        }
    }

    /// Build the authorization URL, embedding the caller-supplied `state`.
    ///
    /// # Errors
    ///
    /// Returns error if the adapter is misconfigured or URL construction
    /// fails.
    pub fn authorization_url(
        &self,
        state: &str,
        redirect_uri: &str,
        scopes: Option<&[&str]>,
    ) -> Result<String> {
        match self {
            Self::Google(p) => p.authorization_url(state, redirect_uri, scopes),
            Self::GitHub(p) => p.authorization_url(state, redirect_uri, scopes),
            Self::Discord(p) => p.authorization_url(state, redirect_uri, scopes),
            Self::Apple(p) => p.authorization_url(state, redirect_uri, scopes),
        }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns `OAuthMisconfigured` for missing credentials and
    /// `OAuthExchangeFailed` when the upstream rejects the code.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<OAuthTokens> {
        match self {
            Self::Google(p) => p.exchange_code(code, redirect_uri).await,
            Self::GitHub(p) => p.exchange_code(code, redirect_uri).await,
            Self::Discord(p) => p.exchange_code(code, redirect_uri).await,
            Self::Apple(p) => p.exchange_code(code, redirect_uri).await,
        }
    }

    /// Fetch and normalize the user's identity.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails or the identity cannot be
    /// normalized.
    pub async fn user_info(
        &self,
        access_token: &str,
        id_token: Option<&str>,
    ) -> Result<OAuthUserInfo> {
        match self {
            Self::Google(p) => p.user_info(access_token, id_token).await,
            Self::GitHub(p) => p.user_info(access_token, id_token).await,
            Self::Discord(p) => p.user_info(access_token, id_token).await,
            Self::Apple(p) => p.user_info(access_token, id_token).await,
        }
    }
}

/// The set of adapters built from configuration.
#[derive(Clone, Default)]
pub struct OAuthAdapters {
    google: Option<OAuthAdapter>,
    github: Option<OAuthAdapter>,
    discord: Option<OAuthAdapter>,
    apple: Option<OAuthAdapter>,
}

impl OAuthAdapters {
    /// Build adapters for every provider with credentials present.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            google: config.google.as_ref().map(|c| {
                OAuthAdapter::Google(GoogleOAuth::new(
                    c.client_id.clone(),
                    c.client_secret.clone(),
                ))
            }),
            github: config.github.as_ref().map(|c| {
                OAuthAdapter::GitHub(GitHubOAuth::new(
                    c.client_id.clone(),
                    c.client_secret.clone(),
                ))
            }),
            discord: config.discord.as_ref().map(|c| {
                OAuthAdapter::Discord(DiscordOAuth::new(
                    c.client_id.clone(),
                    c.client_secret.clone(),
                ))
            }),
            apple: config.apple.as_ref().map(|c| {
                OAuthAdapter::Apple(AppleOAuth::new(
                    c.client_id.clone(),
                    c.team_id.clone(),
                    c.key_id.clone(),
                    c.private_key_pem.clone(),
                ))
            }),
        }
    }

    /// Look up the adapter for a provider, if configured.
    #[must_use]
    pub const fn adapter(&self, kind: OAuthProviderKind) -> Option<&OAuthAdapter> {
        match kind {
            OAuthProviderKind::Google => self.google.as_ref(),
            OAuthProviderKind::GitHub => self.github.as_ref(),
            OAuthProviderKind::Discord => self.discord.as_ref(),
            OAuthProviderKind::Apple => self.apple.as_ref(),
        }
    }
}
