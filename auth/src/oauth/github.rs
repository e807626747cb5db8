//! GitHub OAuth 2.0 adapter.

use super::{OAuthTokens, OAuthUserInfo};
use crate::error::{AuthError, Result};
use reqwest::Client;
use serde::Deserialize;

const AUTHORIZATION_ENDPOINT: &str = "https://github.com/login/oauth/authorize";
const TOKEN_ENDPOINT: &str = "https://github.com/login/oauth/access_token";
const DEFAULT_API_BASE: &str = "https://api.github.com";

const DEFAULT_SCOPES: &[&str] = &["read:user", "user:email"];

// GitHub rejects API requests without a User-Agent.
const USER_AGENT: &str = "opsuite-auth";

/// GitHub OAuth 2.0 adapter.
///
/// GitHub may hide the account email from `/user`. When the profile carries
/// no public email, exactly one secondary request to `/user/emails` selects
/// the primary verified address; when a public email is present the
/// secondary call is skipped entirely. That skip is part of the adapter's
/// contract, not an optimization detail.
#[derive(Clone, Debug)]
pub struct GitHubOAuth {
    /// OAuth app client ID.
    client_id: String,

    /// OAuth app client secret (keep confidential).
    client_secret: String,

    /// REST API base (override for GitHub Enterprise hosts).
    api_base: String,

    /// HTTP client for making requests.
    http_client: Client,
}

impl GitHubOAuth {
    /// Create a new GitHub adapter.
    #[must_use]
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            api_base: DEFAULT_API_BASE.to_string(),
            http_client: Client::new(),
        }
    }

    /// Point the adapter at a GitHub Enterprise API host.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
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
            return Err(AuthError::OAuthMisconfigured { provider: "github".to_string() });
        }

        let scope = scopes.unwrap_or(DEFAULT_SCOPES).join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
        ];

        let query = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Provider(format!("failed to build URL: {e}")))?;

        Ok(format!("{AUTHORIZATION_ENDPOINT}?{query}"))
    }

    /// Exchange an authorization code for tokens.
    ///
    /// GitHub reports rejection in a 200 body (`error` +
    /// `error_description`), not a status code.
    ///
    /// # Errors
    ///
    /// Returns `OAuthMisconfigured` without credentials,
    /// `OAuthExchangeFailed` when GitHub rejects the code.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<OAuthTokens> {
        if !self.is_configured() {
            return Err(AuthError::OAuthMisconfigured { provider: "github".to_string() });
        }

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(TOKEN_ENDPOINT)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::OAuthExchangeFailed {
                provider: "github".to_string(),
                detail: e.to_string(),
            })?;

        let token_response: GitHubTokenResponse =
            response
                .json()
                .await
                .map_err(|e| AuthError::OAuthExchangeFailed {
                    provider: "github".to_string(),
                    detail: e.to_string(),
                })?;

        match token_response.access_token {
            Some(access_token) => Ok(OAuthTokens {
                access_token,
                refresh_token: None,
                id_token: None,
                expires_at: None,
            }),
            None => {
                let detail = token_response
                    .error_description
                    .or(token_response.error)
                    .unwrap_or_else(|| "code rejected".to_string());
                tracing::error!("GitHub token exchange failed: {}", detail);
                Err(AuthError::OAuthExchangeFailed { provider: "github".to_string(), detail })
            }
        }
    }

    /// Fetch the user's identity, falling back to `/user/emails` only when
    /// the profile has no public email.
    ///
    /// # Errors
    ///
    /// Returns `OAuthUserInfoFailed` if a request fails or no verified
    /// primary email exists.
    pub async fn user_info(
        &self,
        access_token: &str,
        _id_token: Option<&str>,
    ) -> Result<OAuthUserInfo> {
        let github_user: GitHubUser = self
            .get_json(&format!("{}/user", self.api_base), access_token)
            .await?;

        // Secondary request only when the profile hides the email.
        let email = match github_user.email {
            Some(email) => email,
            None => {
                let emails: Vec<GitHubEmail> = self
                    .get_json(&format!("{}/user/emails", self.api_base), access_token)
                    .await?;
                primary_verified_email(emails).ok_or_else(|| AuthError::OAuthUserInfoFailed {
                    provider: "github".to_string(),
                    detail: "no verified primary email on the account".to_string(),
                })?
            }
        };

        Ok(OAuthUserInfo {
            provider_user_id: github_user.id.to_string(),
            email,
            // Addresses surfaced by GitHub (public or primary) are verified.
            email_verified: true,
            name: github_user.name.or(Some(github_user.login)),
            avatar_url: github_user.avatar_url,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| AuthError::OAuthUserInfoFailed {
                provider: "github".to_string(),
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %url, "GitHub API request failed: {}", error_body);
            return Err(AuthError::OAuthUserInfoFailed {
                provider: "github".to_string(),
                detail: format!("request failed ({status})"),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::OAuthUserInfoFailed {
                provider: "github".to_string(),
                detail: e.to_string(),
            })
    }
}

/// Select the primary verified address from `/user/emails`.
fn primary_verified_email(emails: Vec<GitHubEmail>) -> Option<String> {
    emails
        .into_iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email)
}

/// GitHub token endpoint response. Errors arrive with a 200 status.
#[derive(Debug, Deserialize)]
struct GitHubTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GitHub user info from `/user`.
#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

/// GitHub email info from `/user/emails`.
#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(addr: &str, primary: bool, verified: bool) -> GitHubEmail {
        GitHubEmail { email: addr.to_string(), primary, verified }
    }

    #[test]
    fn test_authorization_url() {
        let github = GitHubOAuth::new("test_client_id".to_string(), "test_secret".to_string());

        let url = github
            .authorization_url("csrf_state", "http://localhost:3000/callback", None)
            .unwrap();

        assert!(url.starts_with(AUTHORIZATION_ENDPOINT));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("scope=read%3Auser+user%3Aemail"));
        assert!(url.contains("state=csrf_state"));
    }

    #[test]
    fn test_primary_verified_email_selection() {
        let emails = vec![
            email("old@example.com", false, true),
            email("main@example.com", true, true),
            email("unverified@example.com", false, false),
        ];
        assert_eq!(
            primary_verified_email(emails).as_deref(),
            Some("main@example.com")
        );
    }

    #[test]
    fn test_primary_but_unverified_email_is_rejected() {
        let emails = vec![
            email("main@example.com", true, false),
            email("other@example.com", false, true),
        ];
        assert_eq!(primary_verified_email(emails), None);
    }

    #[test]
    fn test_unconfigured_adapter_is_reported() {
        let github = GitHubOAuth::new(String::new(), "secret".to_string());
        assert!(!github.is_configured());
        assert!(matches!(
            github.authorization_url("state", "http://localhost/callback", None),
            Err(AuthError::OAuthMisconfigured { .. })
        ));
    }
}
