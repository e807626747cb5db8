//! Process-wide authentication configuration.
//!
//! Resolved once at startup and treated as immutable for the process
//! lifetime; reloading means rebuilding the value, not mutating shared
//! state. Detection precedence: persisted settings row, then environment
//! presence of managed-platform credentials, then local-only defaults.

use crate::password::PasswordParams;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Which provider family is active for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderSelection {
    /// Self-hosted password-credential provider.
    Local,
    /// External managed identity platform (local remains a fallback path).
    Managed,
}

impl ProviderSelection {
    /// Stable string form used in the settings row.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Managed => "managed",
        }
    }

    /// Parse a selection from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns error if the value is not recognized.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "local" => Ok(Self::Local),
            "managed" => Ok(Self::Managed),
            _ => Err(format!("Unknown provider selection: {s}")),
        }
    }
}

impl std::fmt::Display for ProviderSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local-provider policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPolicy {
    /// Require a verified email before sign-in succeeds.
    pub require_email_verification: bool,

    /// Failed attempts before the account locks.
    pub lockout_threshold: i32,

    /// How long a lockout lasts, in seconds.
    pub lockout_duration_secs: i64,

    /// Session (refresh token) lifetime, in seconds.
    pub session_ttl_secs: i64,

    /// Access token lifetime, in seconds.
    pub access_ttl_secs: i64,

    /// Password-reset token lifetime, in seconds.
    pub reset_token_ttl_secs: i64,

    /// Email-verification token lifetime, in seconds.
    pub verification_token_ttl_secs: i64,
}

impl Default for LocalPolicy {
    fn default() -> Self {
        Self {
            require_email_verification: false,
            lockout_threshold: 5,
            lockout_duration_secs: 15 * 60,
            session_ttl_secs: 7 * 24 * 60 * 60,
            access_ttl_secs: 15 * 60,
            reset_token_ttl_secs: 60 * 60,
            verification_token_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl LocalPolicy {
    /// Lockout window as a [`Duration`].
    #[must_use]
    pub fn lockout_duration(&self) -> Duration {
        Duration::seconds(self.lockout_duration_secs)
    }

    /// Session lifetime as a [`Duration`].
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl_secs)
    }

    /// Reset-token lifetime as a [`Duration`].
    #[must_use]
    pub fn reset_token_ttl(&self) -> Duration {
        Duration::seconds(self.reset_token_ttl_secs)
    }

    /// Verification-token lifetime as a [`Duration`].
    #[must_use]
    pub fn verification_token_ttl(&self) -> Duration {
        Duration::seconds(self.verification_token_ttl_secs)
    }
}

/// Client id/secret pair for an `OAuth` adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCredentials {
    /// OAuth 2.0 client ID.
    pub client_id: String,

    /// OAuth 2.0 client secret (keep confidential).
    pub client_secret: String,
}

/// Apple Sign In credentials.
///
/// Apple has no client-secret string; the secret is a short-lived signed
/// assertion generated from the private key, team id, and key id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppleCredentials {
    /// Services ID (client id).
    pub client_id: String,

    /// Apple Developer team id.
    pub team_id: String,

    /// Key id of the signing key.
    pub key_id: String,

    /// PEM-encoded ES256 private key.
    pub private_key_pem: String,
}

/// Managed identity platform credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the platform.
    pub url: String,

    /// Service (admin) API key.
    pub service_key: String,
}

impl PlatformConfig {
    /// Build from optional parts. Both the URL and the service key must be
    /// present; a partially configured platform is treated as not
    /// configured, never as a degraded managed mode.
    #[must_use]
    pub fn from_parts(url: Option<String>, service_key: Option<String>) -> Option<Self> {
        match (url, service_key) {
            (Some(url), Some(service_key)) => Some(Self { url, service_key }),
            (None, None) => None,
            _ => {
                tracing::warn!(
                    "managed identity platform is partially configured; treating as not configured"
                );
                None
            }
        }
    }
}

/// Settings row persisted in the credential store.
///
/// When present it wins over environment detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSettings {
    /// Active provider selection.
    pub active_provider: ProviderSelection,

    /// Require a verified email before sign-in.
    pub require_email_verification: bool,

    /// Failed attempts before lockout.
    pub lockout_threshold: i32,

    /// Lockout window, seconds.
    pub lockout_duration_secs: i64,

    /// Session lifetime, seconds.
    pub session_ttl_secs: i64,
}

/// Full authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Active provider selection.
    pub active: ProviderSelection,

    /// HS256 secret for access tokens.
    pub jwt_secret: String,

    /// Local-provider policy.
    pub policy: LocalPolicy,

    /// Argon2id cost parameters.
    pub password: PasswordParams,

    /// Managed identity platform, when fully configured.
    pub platform: Option<PlatformConfig>,

    /// Google adapter credentials.
    pub google: Option<OAuthCredentials>,

    /// GitHub adapter credentials.
    pub github: Option<OAuthCredentials>,

    /// Discord adapter credentials.
    pub discord: Option<OAuthCredentials>,

    /// Apple adapter credentials.
    pub apple: Option<AppleCredentials>,
}

impl AuthConfig {
    /// Minimal local-only configuration.
    #[must_use]
    pub fn local(jwt_secret: impl Into<String>) -> Self {
        Self {
            active: ProviderSelection::Local,
            jwt_secret: jwt_secret.into(),
            policy: LocalPolicy::default(),
            password: PasswordParams::default(),
            platform: None,
            google: None,
            github: None,
            discord: None,
            apple: None,
        }
    }

    /// Read configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns error if `AUTH_JWT_SECRET` is unset.
    pub fn from_env() -> crate::error::Result<Self> {
        let jwt_secret = env_var("AUTH_JWT_SECRET").ok_or_else(|| {
            crate::error::AuthError::Provider("AUTH_JWT_SECRET must be set".to_string())
        })?;

        let platform = PlatformConfig::from_parts(
            env_var("AUTH_PLATFORM_URL"),
            env_var("AUTH_PLATFORM_SERVICE_KEY"),
        );

        let mut policy = LocalPolicy::default();
        if let Some(v) = env_var("AUTH_REQUIRE_EMAIL_VERIFICATION") {
            policy.require_email_verification = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = env_var("AUTH_LOCKOUT_THRESHOLD").and_then(|v| v.parse().ok()) {
            policy.lockout_threshold = v;
        }
        if let Some(v) = env_var("AUTH_LOCKOUT_DURATION_SECS").and_then(|v| v.parse().ok()) {
            policy.lockout_duration_secs = v;
        }
        if let Some(v) = env_var("AUTH_SESSION_TTL_SECS").and_then(|v| v.parse().ok()) {
            policy.session_ttl_secs = v;
        }
        if let Some(v) = env_var("AUTH_ACCESS_TTL_SECS").and_then(|v| v.parse().ok()) {
            policy.access_ttl_secs = v;
        }

        let (active, _) = detect(None, platform.as_ref());

        Ok(Self {
            active,
            jwt_secret,
            policy,
            password: PasswordParams::default(),
            platform,
            google: oauth_credentials("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"),
            github: oauth_credentials("GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET"),
            discord: oauth_credentials("DISCORD_CLIENT_ID", "DISCORD_CLIENT_SECRET"),
            apple: apple_credentials(),
        })
    }

    /// Overlay a persisted settings row onto this configuration.
    pub fn apply_persisted(&mut self, settings: &PersistedSettings) {
        self.active = settings.active_provider;
        self.policy.require_email_verification = settings.require_email_verification;
        self.policy.lockout_threshold = settings.lockout_threshold;
        self.policy.lockout_duration_secs = settings.lockout_duration_secs;
        self.policy.session_ttl_secs = settings.session_ttl_secs;
    }
}

/// Resolve the active provider and the reason it was chosen.
///
/// Precedence: persisted settings, then managed-platform credential
/// presence, then local-only default.
#[must_use]
pub fn detect(
    persisted: Option<&PersistedSettings>,
    platform: Option<&PlatformConfig>,
) -> (ProviderSelection, &'static str) {
    if let Some(settings) = persisted {
        return (settings.active_provider, "persisted settings");
    }
    if platform.is_some() {
        return (
            ProviderSelection::Managed,
            "managed platform credentials present",
        );
    }
    (ProviderSelection::Local, "default (no managed platform configured)")
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn oauth_credentials(id_var: &str, secret_var: &str) -> Option<OAuthCredentials> {
    Some(OAuthCredentials {
        client_id: env_var(id_var)?,
        client_secret: env_var(secret_var)?,
    })
}

fn apple_credentials() -> Option<AppleCredentials> {
    Some(AppleCredentials {
        client_id: env_var("APPLE_CLIENT_ID")?,
        team_id: env_var("APPLE_TEAM_ID")?,
        key_id: env_var("APPLE_KEY_ID")?,
        private_key_pem: env_var("APPLE_PRIVATE_KEY")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> PlatformConfig {
        PlatformConfig {
            url: "https://id.example.com".to_string(),
            service_key: "service-key".to_string(),
        }
    }

    fn persisted(active: ProviderSelection) -> PersistedSettings {
        PersistedSettings {
            active_provider: active,
            require_email_verification: true,
            lockout_threshold: 3,
            lockout_duration_secs: 60,
            session_ttl_secs: 3600,
        }
    }

    #[test]
    fn test_detect_prefers_persisted_settings() {
        let settings = persisted(ProviderSelection::Local);
        let (active, reason) = detect(Some(&settings), Some(&platform()));
        assert_eq!(active, ProviderSelection::Local);
        assert_eq!(reason, "persisted settings");
    }

    #[test]
    fn test_detect_falls_back_to_platform_presence() {
        let (active, _) = detect(None, Some(&platform()));
        assert_eq!(active, ProviderSelection::Managed);

        let (active, _) = detect(None, None);
        assert_eq!(active, ProviderSelection::Local);
    }

    #[test]
    fn test_partial_platform_config_is_not_configured() {
        assert!(PlatformConfig::from_parts(Some("https://id.example.com".into()), None).is_none());
        assert!(PlatformConfig::from_parts(None, Some("key".into())).is_none());
        assert!(PlatformConfig::from_parts(None, None).is_none());
        assert!(
            PlatformConfig::from_parts(Some("https://id.example.com".into()), Some("key".into()))
                .is_some()
        );
    }

    #[test]
    fn test_apply_persisted_overlays_policy() {
        let mut config = AuthConfig::local("secret");
        config.apply_persisted(&persisted(ProviderSelection::Managed));

        assert_eq!(config.active, ProviderSelection::Managed);
        assert!(config.policy.require_email_verification);
        assert_eq!(config.policy.lockout_threshold, 3);
        assert_eq!(config.policy.lockout_duration_secs, 60);
        assert_eq!(config.policy.session_ttl_secs, 3600);
    }

    #[test]
    fn test_default_policy_values() {
        let policy = LocalPolicy::default();
        assert_eq!(policy.lockout_threshold, 5);
        assert_eq!(policy.lockout_duration(), Duration::minutes(15));
        assert_eq!(policy.session_ttl(), Duration::days(7));
        assert!(!policy.require_email_verification);
    }
}
