//! Auth facade and provider auto-detection.
//!
//! The facade is the only component callers depend on. It resolves one
//! [`AuthConfig`] at initialization — persisted settings first, then
//! environment detection, then local-only defaults — builds the providers,
//! and performs a single dispatch at the entry point of every capability
//! method. Provider checks are not scattered through call sites.

use crate::config::{self, AuthConfig, ProviderSelection};
use crate::error::{AuthError, Result};
use crate::mailer::Mailer;
use crate::oauth::OAuthAdapters;
use crate::platform::{HttpIdentityPlatform, IdentityPlatform};
use crate::providers::{AuthProvider, LocalAuthProvider, ManagedAuthProvider};
use crate::store::CredentialStore;
use crate::types::{AuthSession, Credentials, OAuthProviderKind, SignUp, User, UserId};
use tracing::{info, warn};

/// Provider-polymorphic authentication service.
///
/// The local provider is always constructed as a fallback path; the managed
/// provider only when the platform is fully configured and selected.
#[derive(Clone)]
pub struct AuthService<S, M, P> {
    config: AuthConfig,
    local: LocalAuthProvider<S, M>,
    managed: Option<ManagedAuthProvider<S, P>>,
    adapters: OAuthAdapters,
}

impl<S, M> AuthService<S, M, HttpIdentityPlatform>
where
    S: CredentialStore,
    M: Mailer,
{
    /// Initialize with the default HTTP platform client, built from the
    /// configuration when the platform is configured.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be loaded or a provider cannot be
    /// constructed.
    pub async fn initialize(store: S, mailer: M, config: AuthConfig) -> Result<Self> {
        let platform = config.platform.as_ref().map(HttpIdentityPlatform::new);
        Self::with_platform(store, mailer, config, platform).await
    }
}

impl<S, M, P> AuthService<S, M, P>
where
    S: CredentialStore,
    M: Mailer,
    P: IdentityPlatform,
{
    /// Initialize with an explicit platform client (tests inject a mock
    /// here).
    ///
    /// Detection precedence: a persisted settings row wins; otherwise the
    /// presence of complete platform credentials selects managed mode;
    /// otherwise local. The selection and its reason are logged.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be loaded or a provider cannot be
    /// constructed.
    pub async fn with_platform(
        store: S,
        mailer: M,
        mut config: AuthConfig,
        platform: Option<P>,
    ) -> Result<Self> {
        let persisted = store.load_settings().await?;
        let (active, reason) = config::detect(persisted.as_ref(), config.platform.as_ref());
        match persisted.as_ref() {
            Some(settings) => config.apply_persisted(settings),
            None => config.active = active,
        }

        let managed = match (config.active, platform) {
            (ProviderSelection::Managed, Some(platform)) => {
                Some(ManagedAuthProvider::new(store.clone(), platform, &config))
            }
            (ProviderSelection::Managed, None) => {
                warn!(
                    "managed provider selected but the platform is not configured; \
                     falling back to local"
                );
                config.active = ProviderSelection::Local;
                None
            }
            (ProviderSelection::Local, _) => None,
        };

        info!(provider = %config.active, reason, "auth provider selected");

        let adapters = OAuthAdapters::from_config(&config);
        let local = LocalAuthProvider::new(store, mailer, &config)?;

        Ok(Self { config, local, managed, adapters })
    }

    /// The active provider selection.
    #[must_use]
    pub const fn active(&self) -> ProviderSelection {
        self.config.active
    }

    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The local provider, always available as a fallback path even when
    /// the managed platform is active.
    #[must_use]
    pub const fn local_provider(&self) -> &LocalAuthProvider<S, M> {
        &self.local
    }

    fn managed_provider(&self) -> Result<&ManagedAuthProvider<S, P>> {
        self.managed.as_ref().ok_or_else(|| {
            AuthError::Provider("managed provider is not configured".to_string())
        })
    }

    /// Build a federated authorization URL embedding the caller-supplied
    /// opaque `state`.
    ///
    /// The caller owns `state`: persist it server-side and compare it on
    /// the callback before exchanging the code. The facade binds it into
    /// the URL but does not track pending authorizations.
    ///
    /// # Errors
    ///
    /// Returns `OAuthMisconfigured` for providers without credentials.
    pub fn oauth_authorization_url(
        &self,
        provider: OAuthProviderKind,
        state: &str,
        redirect_uri: &str,
        scopes: Option<&[&str]>,
    ) -> Result<String> {
        match self.config.active {
            ProviderSelection::Managed => {
                self.managed_provider()?.oauth_url(provider, redirect_uri, state)
            }
            ProviderSelection::Local => self
                .adapters
                .adapter(provider)
                .ok_or_else(|| AuthError::OAuthMisconfigured {
                    provider: provider.as_str().to_string(),
                })?
                .authorization_url(state, redirect_uri, scopes),
        }
    }

    /// Complete a federated callback: exchange the code, normalize the
    /// identity, and open a session.
    ///
    /// # Errors
    ///
    /// Returns adapter/platform errors, or `AccountDisabled` for banned
    /// accounts.
    pub async fn handle_oauth_callback(
        &self,
        provider: OAuthProviderKind,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AuthSession> {
        match self.config.active {
            ProviderSelection::Managed => {
                self.managed_provider()?.handle_oauth_callback(code).await
            }
            ProviderSelection::Local => {
                let adapter = self.adapters.adapter(provider).ok_or_else(|| {
                    AuthError::OAuthMisconfigured { provider: provider.as_str().to_string() }
                })?;
                let tokens = adapter.exchange_code(code, redirect_uri).await?;
                let identity = adapter
                    .user_info(&tokens.access_token, tokens.id_token.as_deref())
                    .await?;
                self.local.sign_in_with_oauth(&identity, provider).await
            }
        }
    }
}

impl<S, M, P> AuthProvider for AuthService<S, M, P>
where
    S: CredentialStore,
    M: Mailer,
    P: IdentityPlatform,
{
    async fn sign_up(&self, request: &SignUp) -> Result<AuthSession> {
        match self.config.active {
            ProviderSelection::Managed => self.managed_provider()?.sign_up(request).await,
            ProviderSelection::Local => self.local.sign_up(request).await,
        }
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession> {
        match self.config.active {
            ProviderSelection::Managed => self.managed_provider()?.sign_in(credentials).await,
            ProviderSelection::Local => self.local.sign_in(credentials).await,
        }
    }

    async fn sign_out(&self, refresh_token: &str) -> Result<()> {
        match self.config.active {
            ProviderSelection::Managed => self.managed_provider()?.sign_out(refresh_token).await,
            ProviderSelection::Local => self.local.sign_out(refresh_token).await,
        }
    }

    async fn verify_token(&self, access_token: &str) -> Result<User> {
        match self.config.active {
            ProviderSelection::Managed => {
                self.managed_provider()?.verify_token(access_token).await
            }
            ProviderSelection::Local => self.local.verify_token(access_token).await,
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        match self.config.active {
            ProviderSelection::Managed => {
                self.managed_provider()?.refresh_session(refresh_token).await
            }
            ProviderSelection::Local => self.local.refresh_session(refresh_token).await,
        }
    }

    async fn reset_password_request(&self, email: &str) -> Result<()> {
        match self.config.active {
            ProviderSelection::Managed => {
                self.managed_provider()?.reset_password_request(email).await
            }
            ProviderSelection::Local => self.local.reset_password_request(email).await,
        }
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        match self.config.active {
            ProviderSelection::Managed => {
                self.managed_provider()?.reset_password(token, new_password).await
            }
            ProviderSelection::Local => self.local.reset_password(token, new_password).await,
        }
    }

    async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        match self.config.active {
            ProviderSelection::Managed => {
                self.managed_provider()?
                    .change_password(user_id, current_password, new_password)
                    .await
            }
            ProviderSelection::Local => {
                self.local
                    .change_password(user_id, current_password, new_password)
                    .await
            }
        }
    }

    async fn verify_email(&self, token: &str) -> Result<User> {
        match self.config.active {
            ProviderSelection::Managed => self.managed_provider()?.verify_email(token).await,
            ProviderSelection::Local => self.local.verify_email(token).await,
        }
    }

    async fn resend_verification(&self, email: &str) -> Result<()> {
        match self.config.active {
            ProviderSelection::Managed => {
                self.managed_provider()?.resend_verification(email).await
            }
            ProviderSelection::Local => self.local.resend_verification(email).await,
        }
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        match self.config.active {
            ProviderSelection::Managed => self.managed_provider()?.get_user(id).await,
            ProviderSelection::Local => self.local.get_user(id).await,
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.config.active {
            ProviderSelection::Managed => self.managed_provider()?.get_user_by_email(email).await,
            ProviderSelection::Local => self.local.get_user_by_email(email).await,
        }
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        match self.config.active {
            ProviderSelection::Managed => self.managed_provider()?.update_user(user).await,
            ProviderSelection::Local => self.local.update_user(user).await,
        }
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        match self.config.active {
            ProviderSelection::Managed => self.managed_provider()?.delete_user(id).await,
            ProviderSelection::Local => self.local.delete_user(id).await,
        }
    }
}
