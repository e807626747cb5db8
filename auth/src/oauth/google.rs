//! Google OAuth 2.0 adapter.

use super::{OAuthTokens, OAuthUserInfo};
use crate::error::{AuthError, Result};
use reqwest::Client;
use serde::Deserialize;

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const DEFAULT_SCOPES: &[&str] = &["openid", "email", "profile"];

/// Google OAuth 2.0 adapter.
///
/// Google's userinfo endpoint returns the verified-email flag and profile
/// fields directly, so normalization is a single request.
///
/// # Configuration
///
/// 1. Create OAuth 2.0 credentials in Google Cloud Console
/// 2. Configure authorized redirect URIs
/// 3. Set `GOOGLE_CLIENT_ID` and `GOOGLE_CLIENT_SECRET`
#[derive(Clone, Debug)]
pub struct GoogleOAuth {
    /// OAuth 2.0 client ID from Google Cloud Console.
    client_id: String,

    /// OAuth 2.0 client secret (keep confidential).
    client_secret: String,

    /// HTTP client for making requests.
    http_client: Client,
}

impl GoogleOAuth {
    /// Create a new Google adapter.
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
            return Err(AuthError::OAuthMisconfigured { provider: "google".to_string() });
        }

        let scope = scopes.unwrap_or(DEFAULT_SCOPES).join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
            ("access_type", "offline"),
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
    /// `OAuthExchangeFailed` when Google rejects the code.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<OAuthTokens> {
        if !self.is_configured() {
            return Err(AuthError::OAuthMisconfigured { provider: "google".to_string() });
        }

        let params = [
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http_client
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::OAuthExchangeFailed {
                provider: "google".to_string(),
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(%status, "Google token exchange failed: {}", error_body);
            return Err(AuthError::OAuthExchangeFailed {
                provider: "google".to_string(),
                detail: format!("code rejected ({status})"),
            });
        }

        let google_response: GoogleTokenResponse =
            response
                .json()
                .await
                .map_err(|e| AuthError::OAuthExchangeFailed {
                    provider: "google".to_string(),
                    detail: e.to_string(),
                })?;

        let expires_at = google_response
            .expires_in
            .map(|expires_in| chrono::Utc::now() + chrono::Duration::seconds(i64::from(expires_in)));

        Ok(OAuthTokens {
            access_token: google_response.access_token,
            refresh_token: google_response.refresh_token,
            id_token: google_response.id_token,
            expires_at,
        })
    }

    /// Fetch the user's identity from the userinfo endpoint.
    ///
    /// # Errors
    ///
    /// Returns `OAuthUserInfoFailed` if the request fails or the response
    /// is malformed.
    pub async fn user_info(
        &self,
        access_token: &str,
        _id_token: Option<&str>,
    ) -> Result<OAuthUserInfo> {
        let response = self
            .http_client
            .get(USERINFO_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::OAuthUserInfoFailed {
                provider: "google".to_string(),
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(%status, "Google userinfo request failed: {}", error_body);
            return Err(AuthError::OAuthUserInfoFailed {
                provider: "google".to_string(),
                detail: format!("userinfo fetch failed ({status})"),
            });
        }

        let google_user: GoogleUserInfo =
            response
                .json()
                .await
                .map_err(|e| AuthError::OAuthUserInfoFailed {
                    provider: "google".to_string(),
                    detail: e.to_string(),
                })?;

        Ok(OAuthUserInfo {
            provider_user_id: google_user.sub,
            email: google_user.email,
            email_verified: google_user.email_verified,
            name: google_user.name,
            avatar_url: google_user.picture,
        })
    }
}

/// Google's token endpoint response format.
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    /// Access token for API requests.
    access_token: String,

    /// Token expiration in seconds (typically 3600).
    expires_in: Option<u32>,

    /// Refresh token (only on initial authorization with access_type=offline).
    refresh_token: Option<String>,

    /// ID token (JWT) containing user claims (only with openid scope).
    id_token: Option<String>,
}

/// Google's userinfo endpoint response format.
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    /// Google user ID (stable, unique identifier).
    sub: String,

    /// Full name.
    name: Option<String>,

    /// Profile picture URL.
    picture: Option<String>,

    /// Email address.
    email: String,

    /// Whether email is verified by Google.
    email_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url() {
        let google = GoogleOAuth::new("test_client_id".to_string(), "test_secret".to_string());

        let url = google
            .authorization_url("test_state_123", "http://localhost:3000/callback", None)
            .unwrap();

        assert!(url.starts_with(AUTHORIZATION_ENDPOINT));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid+email+profile"));
        assert!(url.contains("state=test_state_123"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn test_authorization_url_with_custom_scopes() {
        let google = GoogleOAuth::new("test_client_id".to_string(), "test_secret".to_string());

        let url = google
            .authorization_url(
                "state",
                "http://localhost:3000/callback",
                Some(&["openid", "email"]),
            )
            .unwrap();

        assert!(url.contains("scope=openid+email"));
        assert!(!url.contains("profile"));
    }

    #[test]
    fn test_unconfigured_adapter_is_reported() {
        let google = GoogleOAuth::new(String::new(), String::new());

        assert!(!google.is_configured());
        assert!(matches!(
            google.authorization_url("state", "http://localhost/callback", None),
            Err(AuthError::OAuthMisconfigured { .. })
        ));
    }
}
