//! Discord OAuth 2.0 adapter.

use super::{OAuthTokens, OAuthUserInfo};
use crate::error::{AuthError, Result};
use reqwest::Client;
use serde::Deserialize;

const AUTHORIZATION_ENDPOINT: &str = "https://discord.com/api/oauth2/authorize";
const TOKEN_ENDPOINT: &str = "https://discord.com/api/oauth2/token";
const USER_ENDPOINT: &str = "https://discord.com/api/users/@me";

const CDN_BASE: &str = "https://cdn.discordapp.com";

const DEFAULT_SCOPES: &[&str] = &["identify", "email"];

/// Discord OAuth 2.0 adapter.
///
/// Discord does not return an avatar URL; it returns an optional hash that
/// must be combined with the user id, and accounts without a custom avatar
/// get a deterministic default from the CDN's embed set.
#[derive(Clone, Debug)]
pub struct DiscordOAuth {
    /// Application client ID.
    client_id: String,

    /// Application client secret (keep confidential).
    client_secret: String,

    /// HTTP client for making requests.
    http_client: Client,
}

impl DiscordOAuth {
    /// Create a new Discord adapter.
    #[must_use]
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            http_client: Client::new(),
        }
    }

    /// Whether both client id and secret are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Build the authorization URL.
    ///
    /// # Errors
    ///
    /// Returns error if the adapter is misconfigured.
    pub fn authorization_url(
        &self,
        state: &str,
        redirect_uri: &str,
        scopes: Option<&[&str]>,
    ) -> Result<String> {
        if !self.is_configured() {
            return Err(AuthError::OAuthMisconfigured { provider: "discord".to_string() });
        }

        let scope = scopes.unwrap_or(DEFAULT_SCOPES).join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
        ];

        let query = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Provider(format!("failed to build URL: {e}")))?;

        Ok(format!("{AUTHORIZATION_ENDPOINT}?{query}"))
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns `OAuthMisconfigured` without credentials,
    /// `OAuthExchangeFailed` when Discord rejects the code.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<OAuthTokens> {
        if !self.is_configured() {
            return Err(AuthError::OAuthMisconfigured { provider: "discord".to_string() });
        }

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::OAuthExchangeFailed {
                provider: "discord".to_string(),
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(%status, "Discord token exchange failed: {}", error_body);
            return Err(AuthError::OAuthExchangeFailed {
                provider: "discord".to_string(),
                detail: format!("code rejected ({status})"),
            });
        }

        let token_response: DiscordTokenResponse =
            response
                .json()
                .await
                .map_err(|e| AuthError::OAuthExchangeFailed {
                    provider: "discord".to_string(),
                    detail: e.to_string(),
                })?;

        let expires_at = token_response
            .expires_in
            .map(|expires_in| chrono::Utc::now() + chrono::Duration::seconds(expires_in));

        Ok(OAuthTokens {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            id_token: None,
            expires_at,
        })
    }

    /// Fetch the user's identity from `/users/@me`.
    ///
    /// # Errors
    ///
    /// Returns `OAuthUserInfoFailed` if the request fails or the account
    /// has no email (missing `email` scope).
    pub async fn user_info(
        &self,
        access_token: &str,
        _id_token: Option<&str>,
    ) -> Result<OAuthUserInfo> {
        let response = self
            .http_client
            .get(USER_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::OAuthUserInfoFailed {
                provider: "discord".to_string(),
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(%status, "Discord user request failed: {}", error_body);
            return Err(AuthError::OAuthUserInfoFailed {
                provider: "discord".to_string(),
                detail: format!("user fetch failed ({status})"),
            });
        }

        let discord_user: DiscordUser =
            response
                .json()
                .await
                .map_err(|e| AuthError::OAuthUserInfoFailed {
                    provider: "discord".to_string(),
                    detail: e.to_string(),
                })?;

        let email = discord_user
            .email
            .ok_or_else(|| AuthError::OAuthUserInfoFailed {
                provider: "discord".to_string(),
                detail: "account has no email (is the `email` scope granted?)".to_string(),
            })?;

        let avatar = avatar_url(
            &discord_user.id,
            discord_user.discriminator.as_deref(),
            discord_user.avatar.as_deref(),
        );

        Ok(OAuthUserInfo {
            provider_user_id: discord_user.id,
            email,
            email_verified: discord_user.verified.unwrap_or(false),
            name: discord_user.global_name.or(Some(discord_user.username)),
            avatar_url: Some(avatar),
        })
    }
}

/// Derive the avatar URL from a user id plus the optional avatar hash.
///
/// With no custom avatar, a deterministic default is synthesized: legacy
/// accounts (non-zero discriminator) index by `discriminator % 5`, migrated
/// accounts by `(id >> 22) % 6`.
fn avatar_url(id: &str, discriminator: Option<&str>, avatar: Option<&str>) -> String {
    if let Some(hash) = avatar {
        return format!("{CDN_BASE}/avatars/{id}/{hash}.png");
    }

    let index = match discriminator.and_then(|d| d.parse::<u64>().ok()) {
        Some(d) if d != 0 => d % 5,
        _ => (id.parse::<u64>().unwrap_or(0) >> 22) % 6,
    };
    format!("{CDN_BASE}/embed/avatars/{index}.png")
}

/// Discord token endpoint response format.
#[derive(Debug, Deserialize)]
struct DiscordTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

/// Discord user object from `/users/@me`.
#[derive(Debug, Deserialize)]
struct DiscordUser {
    /// Snowflake id (stringified 64-bit integer).
    id: String,
    username: String,
    /// "0" for accounts migrated to unique usernames.
    discriminator: Option<String>,
    global_name: Option<String>,
    avatar: Option<String>,
    email: Option<String>,
    verified: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url() {
        let discord = DiscordOAuth::new("test_client_id".to_string(), "test_secret".to_string());

        let url = discord
            .authorization_url("csrf_state", "http://localhost:3000/callback", None)
            .unwrap();

        assert!(url.starts_with(AUTHORIZATION_ENDPOINT));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("scope=identify+email"));
        assert!(url.contains("state=csrf_state"));
    }

    #[test]
    fn test_custom_avatar_uses_hash() {
        let url = avatar_url("80351110224678912", Some("1337"), Some("8342729096ea3675442027381ff50dfe"));
        assert_eq!(
            url,
            "https://cdn.discordapp.com/avatars/80351110224678912/8342729096ea3675442027381ff50dfe.png"
        );
    }

    #[test]
    fn test_default_avatar_is_deterministic_for_legacy_accounts() {
        // discriminator 1337 % 5 == 2
        let url = avatar_url("80351110224678912", Some("1337"), None);
        assert_eq!(url, "https://cdn.discordapp.com/embed/avatars/2.png");
        assert_eq!(url, avatar_url("80351110224678912", Some("1337"), None));
    }

    #[test]
    fn test_default_avatar_for_migrated_accounts_uses_id() {
        // (80351110224678912 >> 22) % 6 == 5
        let url = avatar_url("80351110224678912", Some("0"), None);
        assert_eq!(url, "https://cdn.discordapp.com/embed/avatars/5.png");

        // Missing discriminator behaves the same
        assert_eq!(url, avatar_url("80351110224678912", None, None));
    }
}
