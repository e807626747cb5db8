//! Facade initialization, provider auto-detection, and cross-provider
//! token hygiene.

use opsuite_auth::config::{OAuthCredentials, PlatformConfig};
use opsuite_auth::mocks::{MemoryCredentialStore, MockIdentityPlatform, MockMailer};
use opsuite_auth::providers::{AuthProvider, LocalAuthProvider};
use opsuite_auth::{
    AuthConfig, AuthError, AuthService, CredentialStore, OAuthProviderKind, PasswordParams,
    PersistedSettings, ProviderSelection, SignUp,
};

fn base_config() -> AuthConfig {
    let mut config = AuthConfig::local("facade-test-secret");
    config.password = PasswordParams { memory_kib: 1024, time_cost: 1, parallelism: 1 };
    config
}

fn with_platform_config(mut config: AuthConfig) -> AuthConfig {
    config.platform = Some(PlatformConfig {
        url: "https://id.example.com".to_string(),
        service_key: "service-key".to_string(),
    });
    config
}

fn persisted(active: ProviderSelection) -> PersistedSettings {
    PersistedSettings {
        active_provider: active,
        require_email_verification: false,
        lockout_threshold: 5,
        lockout_duration_secs: 900,
        session_ttl_secs: 3600,
    }
}

fn sign_up(email: &str) -> SignUp {
    SignUp {
        email: email.to_string(),
        password: "Secure123".to_string(),
        name: None,
    }
}

#[tokio::test]
async fn defaults_to_local_when_nothing_is_configured() {
    let service = AuthService::with_platform(
        MemoryCredentialStore::new(),
        MockMailer::new(),
        base_config(),
        None::<MockIdentityPlatform>,
    )
    .await
    .unwrap();

    assert_eq!(service.active(), ProviderSelection::Local);

    // And it actually authenticates.
    let session = service.sign_up(&sign_up("alice@example.com")).await.unwrap();
    service
        .verify_token(&session.tokens.access_token)
        .await
        .unwrap();
}

#[tokio::test]
async fn platform_credentials_select_managed_mode() {
    let service = AuthService::with_platform(
        MemoryCredentialStore::new(),
        MockMailer::new(),
        with_platform_config(base_config()),
        Some(MockIdentityPlatform::new()),
    )
    .await
    .unwrap();

    assert_eq!(service.active(), ProviderSelection::Managed);

    let session = service.sign_up(&sign_up("alice@example.com")).await.unwrap();
    assert!(session.session.platform_refresh_token.is_some());
}

#[tokio::test]
async fn persisted_settings_override_environment_detection() {
    let store = MemoryCredentialStore::new();
    store
        .save_settings(&persisted(ProviderSelection::Local))
        .await
        .unwrap();

    // Platform credentials are present, but the settings row pins local.
    let service = AuthService::with_platform(
        store,
        MockMailer::new(),
        with_platform_config(base_config()),
        Some(MockIdentityPlatform::new()),
    )
    .await
    .unwrap();

    assert_eq!(service.active(), ProviderSelection::Local);
}

#[tokio::test]
async fn persisted_policy_knobs_apply() {
    let store = MemoryCredentialStore::new();
    let mut settings = persisted(ProviderSelection::Local);
    settings.lockout_threshold = 2;
    store.save_settings(&settings).await.unwrap();

    let service = AuthService::with_platform(
        store,
        MockMailer::new(),
        base_config(),
        None::<MockIdentityPlatform>,
    )
    .await
    .unwrap();

    assert_eq!(service.config().policy.lockout_threshold, 2);
}

#[tokio::test]
async fn managed_selection_without_a_platform_falls_back_to_local() {
    let store = MemoryCredentialStore::new();
    store
        .save_settings(&persisted(ProviderSelection::Managed))
        .await
        .unwrap();

    let service = AuthService::with_platform(
        store,
        MockMailer::new(),
        base_config(),
        None::<MockIdentityPlatform>,
    )
    .await
    .unwrap();

    assert_eq!(service.active(), ProviderSelection::Local);
    service.sign_up(&sign_up("alice@example.com")).await.unwrap();
}

#[tokio::test]
async fn tokens_do_not_cross_provider_verification_paths() {
    let store = MemoryCredentialStore::new();
    let config = with_platform_config(base_config());

    let service = AuthService::with_platform(
        store.clone(),
        MockMailer::new(),
        config.clone(),
        Some(MockIdentityPlatform::new()),
    )
    .await
    .unwrap();
    assert_eq!(service.active(), ProviderSelection::Managed);

    // Token minted by the managed provider...
    let session = service.sign_up(&sign_up("alice@example.com")).await.unwrap();
    service
        .verify_token(&session.tokens.access_token)
        .await
        .unwrap();

    // ...must be rejected explicitly by the local verification path.
    let local = LocalAuthProvider::new(store, MockMailer::new(), &config).unwrap();
    let err = local
        .verify_token(&session.tokens.access_token)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AuthError::ProviderMismatch {
            expected: "local".to_string(),
            actual: "managed".to_string(),
        }
    );
}

#[tokio::test]
async fn local_provider_remains_available_as_a_fallback_in_managed_mode() {
    let service = AuthService::with_platform(
        MemoryCredentialStore::new(),
        MockMailer::new(),
        with_platform_config(base_config()),
        Some(MockIdentityPlatform::new()),
    )
    .await
    .unwrap();
    assert_eq!(service.active(), ProviderSelection::Managed);

    // The fallback path authenticates against the same store.
    let session = service
        .local_provider()
        .sign_up(&sign_up("fallback@example.com"))
        .await
        .unwrap();
    service
        .local_provider()
        .verify_token(&session.tokens.access_token)
        .await
        .unwrap();
}

#[tokio::test]
async fn oauth_url_dispatch_follows_the_active_provider() {
    // Local mode with GitHub credentials: the adapter builds the URL.
    let mut config = base_config();
    config.github = Some(OAuthCredentials {
        client_id: "gh-client".to_string(),
        client_secret: "gh-secret".to_string(),
    });
    let service = AuthService::with_platform(
        MemoryCredentialStore::new(),
        MockMailer::new(),
        config,
        None::<MockIdentityPlatform>,
    )
    .await
    .unwrap();

    let url = service
        .oauth_authorization_url(
            OAuthProviderKind::GitHub,
            "state-1",
            "https://app.example.com/cb",
            None,
        )
        .unwrap();
    assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
    assert!(url.contains("state=state-1"));

    // Unconfigured provider: a misconfiguration, not an upstream error.
    assert!(matches!(
        service.oauth_authorization_url(
            OAuthProviderKind::Discord,
            "state-1",
            "https://app.example.com/cb",
            None,
        ),
        Err(AuthError::OAuthMisconfigured { .. })
    ));

    // Managed mode: the platform owns the URL.
    let service = AuthService::with_platform(
        MemoryCredentialStore::new(),
        MockMailer::new(),
        with_platform_config(base_config()),
        Some(MockIdentityPlatform::new()),
    )
    .await
    .unwrap();
    let url = service
        .oauth_authorization_url(
            OAuthProviderKind::GitHub,
            "state-2",
            "https://app.example.com/cb",
            None,
        )
        .unwrap();
    assert!(url.starts_with("https://platform.mock/auth/v1/authorize?"));
    assert!(url.contains("state=state-2"));
}

#[tokio::test]
async fn managed_oauth_callback_flows_through_the_facade() {
    let platform = MockIdentityPlatform::new();
    platform.register_oauth_code("good-code", "octo@example.com", None);

    let service = AuthService::with_platform(
        MemoryCredentialStore::new(),
        MockMailer::new(),
        with_platform_config(base_config()),
        Some(platform),
    )
    .await
    .unwrap();

    let session = service
        .handle_oauth_callback(OAuthProviderKind::GitHub, "good-code", "https://app.example.com/cb")
        .await
        .unwrap();
    assert_eq!(session.user.email, "octo@example.com");
    service
        .verify_token(&session.tokens.access_token)
        .await
        .unwrap();
}
