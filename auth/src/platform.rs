//! Managed identity platform client.
//!
//! The managed provider delegates credential lifecycle to an external
//! platform exposing a GoTrue-compatible REST surface. The client is a thin
//! transport: it never interprets platform error strings — that mapping
//! lives in the managed provider, against the shared error taxonomy.

use crate::config::PlatformConfig;
use crate::types::OAuthProviderKind;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

/// Error surface of the platform client.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlatformError {
    /// The platform rejected the request; `message` is the platform's own
    /// error string (e.g. "User already registered").
    #[error("platform rejected request: {message}")]
    Rejected {
        /// Platform error string, matched by the managed provider.
        message: String,
    },

    /// Transport or decoding failure.
    #[error("platform transport error: {0}")]
    Transport(String),
}

/// User record as the platform reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformUser {
    /// Platform-side user id.
    pub id: String,

    /// Email address.
    pub email: String,

    /// Whether the platform has confirmed the email.
    pub email_confirmed: bool,

    /// Display name from user metadata.
    pub name: Option<String>,

    /// Avatar URL from user metadata.
    pub avatar_url: Option<String>,
}

/// Result of a platform operation: the user, plus tokens when the platform
/// opened a session (sign-up with confirmation required returns none).
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformSession {
    /// The platform's view of the user.
    pub user: PlatformUser,

    /// Platform access token, when a session was opened.
    pub access_token: Option<String>,

    /// Platform refresh token, when a session was opened.
    pub refresh_token: Option<String>,
}

/// Contract the managed provider depends on.
pub trait IdentityPlatform: Send + Sync {
    /// Register a credential with the platform.
    ///
    /// # Errors
    ///
    /// Returns the platform's rejection or a transport error.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = std::result::Result<PlatformSession, PlatformError>> + Send;

    /// Authenticate a password credential.
    ///
    /// # Errors
    ///
    /// Returns the platform's rejection or a transport error.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = std::result::Result<PlatformSession, PlatformError>> + Send;

    /// Rotate a platform refresh token.
    ///
    /// # Errors
    ///
    /// Returns the platform's rejection or a transport error.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = std::result::Result<PlatformSession, PlatformError>> + Send;

    /// Exchange an OAuth callback code at the platform.
    ///
    /// # Errors
    ///
    /// Returns the platform's rejection or a transport error.
    fn exchange_code(
        &self,
        code: &str,
    ) -> impl Future<Output = std::result::Result<PlatformSession, PlatformError>> + Send;

    /// Build the platform's authorization URL for a federated provider.
    ///
    /// # Errors
    ///
    /// Returns error if URL construction fails.
    fn authorize_url(
        &self,
        provider: OAuthProviderKind,
        redirect_to: &str,
        state: &str,
    ) -> std::result::Result<String, PlatformError>;

    /// Ask the platform to send a password-recovery email.
    ///
    /// # Errors
    ///
    /// Returns the platform's rejection or a transport error.
    fn recover(
        &self,
        email: &str,
    ) -> impl Future<Output = std::result::Result<(), PlatformError>> + Send;

    /// Ask the platform to resend the sign-up confirmation email.
    ///
    /// # Errors
    ///
    /// Returns the platform's rejection or a transport error.
    fn resend_verification(
        &self,
        email: &str,
    ) -> impl Future<Output = std::result::Result<(), PlatformError>> + Send;

    /// Consume a one-shot platform token (`kind` is the platform's token
    /// type, e.g. `recovery` or `signup`).
    ///
    /// # Errors
    ///
    /// Returns the platform's rejection or a transport error.
    fn verify(
        &self,
        kind: &str,
        token: &str,
    ) -> impl Future<Output = std::result::Result<PlatformSession, PlatformError>> + Send;

    /// Replace the password of the user owning `access_token`.
    ///
    /// # Errors
    ///
    /// Returns the platform's rejection or a transport error.
    fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> impl Future<Output = std::result::Result<(), PlatformError>> + Send;
}

/// HTTP client for a GoTrue-compatible platform.
#[derive(Clone)]
pub struct HttpIdentityPlatform {
    base_url: String,
    service_key: String,
    http_client: Client,
}

impl HttpIdentityPlatform {
    /// Create a client from the platform configuration.
    #[must_use]
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            http_client: Client::new(),
        }
    }

    async fn post_auth(
        &self,
        path_and_query: &str,
        body: serde_json::Value,
    ) -> std::result::Result<PlatformSession, PlatformError> {
        let url = format!("{}{path_and_query}", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = parse_error_message(&body)
                .unwrap_or_else(|| format!("request failed ({status})"));
            return Err(PlatformError::Rejected { message });
        }

        let body: SessionBody = response
            .json()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        body.try_into()
    }

    async fn post_empty(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> std::result::Result<(), PlatformError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = parse_error_message(&body)
                .unwrap_or_else(|| format!("request failed ({status})"));
            return Err(PlatformError::Rejected { message });
        }
        Ok(())
    }
}

impl IdentityPlatform for HttpIdentityPlatform {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<PlatformSession, PlatformError> {
        self.post_auth(
            "/auth/v1/signup",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<PlatformSession, PlatformError> {
        self.post_auth(
            "/auth/v1/token?grant_type=password",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn refresh(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<PlatformSession, PlatformError> {
        self.post_auth(
            "/auth/v1/token?grant_type=refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn exchange_code(
        &self,
        code: &str,
    ) -> std::result::Result<PlatformSession, PlatformError> {
        self.post_auth(
            "/auth/v1/token?grant_type=pkce",
            serde_json::json!({ "auth_code": code }),
        )
        .await
    }

    fn authorize_url(
        &self,
        provider: OAuthProviderKind,
        redirect_to: &str,
        state: &str,
    ) -> std::result::Result<String, PlatformError> {
        let params = [
            ("provider", provider.as_str()),
            ("redirect_to", redirect_to),
            ("state", state),
        ];
        let query = serde_urlencoded::to_string(params)
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(format!("{}/auth/v1/authorize?{query}", self.base_url))
    }

    async fn recover(&self, email: &str) -> std::result::Result<(), PlatformError> {
        self.post_empty("/auth/v1/recover", serde_json::json!({ "email": email }))
            .await
    }

    async fn resend_verification(&self, email: &str) -> std::result::Result<(), PlatformError> {
        self.post_empty(
            "/auth/v1/resend",
            serde_json::json!({ "type": "signup", "email": email }),
        )
        .await
    }

    async fn verify(
        &self,
        kind: &str,
        token: &str,
    ) -> std::result::Result<PlatformSession, PlatformError> {
        self.post_auth(
            "/auth/v1/verify",
            serde_json::json!({ "type": kind, "token": token }),
        )
        .await
    }

    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> std::result::Result<(), PlatformError> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .http_client
            .put(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "password": new_password }))
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = parse_error_message(&body)
                .unwrap_or_else(|| format!("request failed ({status})"));
            return Err(PlatformError::Rejected { message });
        }
        Ok(())
    }
}

/// GoTrue error bodies vary in shape; pick the first message-like field.
fn parse_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    for key in ["msg", "message", "error_description", "error"] {
        if let Some(message) = value.get(key).and_then(serde_json::Value::as_str) {
            return Some(message.to_string());
        }
    }
    None
}

/// Session/user response body. Sign-up with confirmation enabled returns a
/// bare user object; token grants return a session wrapping one.
#[derive(Debug, Deserialize)]
struct SessionBody {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserBody>,

    // Bare-user shape
    id: Option<String>,
    email: Option<String>,
    email_confirmed_at: Option<String>,
    user_metadata: Option<MetaBody>,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    id: String,
    email: Option<String>,
    email_confirmed_at: Option<String>,
    user_metadata: Option<MetaBody>,
}

#[derive(Debug, Deserialize)]
struct MetaBody {
    name: Option<String>,
    full_name: Option<String>,
    avatar_url: Option<String>,
}

fn platform_user(
    id: String,
    email: Option<String>,
    email_confirmed_at: Option<String>,
    meta: Option<MetaBody>,
) -> PlatformUser {
    let (name, avatar_url) = meta
        .map(|m| (m.name.or(m.full_name), m.avatar_url))
        .unwrap_or((None, None));
    PlatformUser {
        id,
        email: email.unwrap_or_default(),
        email_confirmed: email_confirmed_at.is_some(),
        name,
        avatar_url,
    }
}

impl TryFrom<SessionBody> for PlatformSession {
    type Error = PlatformError;

    fn try_from(body: SessionBody) -> std::result::Result<Self, PlatformError> {
        let user = match (body.user, body.id) {
            (Some(user), _) => {
                platform_user(user.id, user.email, user.email_confirmed_at, user.user_metadata)
            }
            (None, Some(id)) => {
                platform_user(id, body.email, body.email_confirmed_at, body.user_metadata)
            }
            (None, None) => {
                return Err(PlatformError::Transport(
                    "platform response carried no user".to_string(),
                ));
            }
        };

        Ok(Self {
            user,
            access_token: body.access_token,
            refresh_token: body.refresh_token,
        })
    }
}
