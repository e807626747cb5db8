//! Managed-identity provider integration tests.
//!
//! Drives the delegating provider against the scriptable platform fake:
//! error-string mapping, the local user mirror, and delegated rotation.

use opsuite_auth::mocks::{MemoryCredentialStore, MockIdentityPlatform};
use opsuite_auth::providers::{AuthProvider, ManagedAuthProvider};
use opsuite_auth::{AuthConfig, AuthError, Credentials, CredentialStore, SignUp, TokenKind};

fn test_config() -> AuthConfig {
    AuthConfig::local("managed-test-secret")
}

fn provider() -> (
    ManagedAuthProvider<MemoryCredentialStore, MockIdentityPlatform>,
    MemoryCredentialStore,
    MockIdentityPlatform,
) {
    let store = MemoryCredentialStore::new();
    let platform = MockIdentityPlatform::new();
    let provider = ManagedAuthProvider::new(store.clone(), platform.clone(), &test_config());
    (provider, store, platform)
}

fn sign_up(email: &str, password: &str) -> SignUp {
    SignUp { email: email.to_string(), password: password.to_string(), name: None }
}

fn credentials(email: &str, password: &str) -> Credentials {
    Credentials { email: email.to_string(), password: password.to_string() }
}

#[tokio::test]
async fn sign_up_delegates_and_mirrors_the_user_locally() {
    let (provider, store, _) = provider();

    let session = provider
        .sign_up(&sign_up("alice@example.com", "Secure123"))
        .await
        .unwrap();

    assert_eq!(session.user.email, "alice@example.com");
    assert!(session.user.email_verified);
    assert!(!session.tokens.access_token.is_empty());

    // The mirror row serves email lookups without touching the platform.
    let mirrored = store.get_user_by_email("alice@example.com").await.unwrap();
    assert_eq!(mirrored.map(|u| u.id), Some(session.user.id));
}

#[tokio::test]
async fn platform_error_strings_map_onto_the_shared_taxonomy() {
    let (provider, _, _) = provider();
    provider
        .sign_up(&sign_up("alice@example.com", "Secure123"))
        .await
        .unwrap();

    // "User already registered"
    assert_eq!(
        provider
            .sign_up(&sign_up("alice@example.com", "Other1234"))
            .await
            .unwrap_err(),
        AuthError::UserAlreadyExists
    );

    // "Invalid login credentials" — for unknown email and wrong password
    // alike.
    assert_eq!(
        provider
            .sign_in(&credentials("alice@example.com", "Wrong1234"))
            .await
            .unwrap_err(),
        AuthError::InvalidCredentials
    );
    assert_eq!(
        provider
            .sign_in(&credentials("nobody@example.com", "Secure123"))
            .await
            .unwrap_err(),
        AuthError::InvalidCredentials
    );
}

#[tokio::test]
async fn confirmation_required_gates_sign_in_until_verified() {
    let store = MemoryCredentialStore::new();
    let platform = MockIdentityPlatform::new().with_confirmation_required();
    let provider = ManagedAuthProvider::new(store, platform.clone(), &test_config());

    // The platform withholds the session until the email confirms.
    assert_eq!(
        provider
            .sign_up(&sign_up("alice@example.com", "Secure123"))
            .await
            .unwrap_err(),
        AuthError::EmailNotVerified
    );

    // "Email not confirmed"
    assert_eq!(
        provider
            .sign_in(&credentials("alice@example.com", "Secure123"))
            .await
            .unwrap_err(),
        AuthError::EmailNotVerified
    );

    // Consume the platform's confirmation token, then sign in.
    let token = platform.last_token().unwrap();
    let user = provider.verify_email(&token).await.unwrap();
    assert!(user.email_verified);

    provider
        .sign_in(&credentials("alice@example.com", "Secure123"))
        .await
        .unwrap();
}

#[tokio::test]
async fn refresh_rotates_both_token_pairs() {
    let (provider, _, _) = provider();
    let session = provider
        .sign_up(&sign_up("alice@example.com", "Secure123"))
        .await
        .unwrap();

    let rotated = provider
        .refresh_session(&session.tokens.refresh_token)
        .await
        .unwrap();
    assert_ne!(rotated.tokens.refresh_token, session.tokens.refresh_token);
    assert_ne!(
        rotated.session.platform_refresh_token,
        session.session.platform_refresh_token
    );

    // The retired local token is dead.
    assert_eq!(
        provider
            .refresh_session(&session.tokens.refresh_token)
            .await
            .unwrap_err(),
        AuthError::InvalidToken { kind: TokenKind::Refresh }
    );

    provider
        .refresh_session(&rotated.tokens.refresh_token)
        .await
        .unwrap();
}

#[tokio::test]
async fn mirror_upsert_is_idempotent_across_sign_ins() {
    let (provider, _, _) = provider();
    let first = provider
        .sign_up(&sign_up("alice@example.com", "Secure123"))
        .await
        .unwrap();

    let second = provider
        .sign_in(&credentials("alice@example.com", "Secure123"))
        .await
        .unwrap();

    // Same platform user, same mirror row.
    assert_eq!(second.user.id, first.user.id);
}

#[tokio::test]
async fn reset_flow_delegates_and_revokes_local_sessions() {
    let (provider, store, platform) = provider();
    let session = provider
        .sign_up(&sign_up("alice@example.com", "Secure123"))
        .await
        .unwrap();
    let user_id = session.user.id;

    // Unknown addresses stay silent.
    provider
        .reset_password_request("nobody@example.com")
        .await
        .unwrap();

    provider
        .reset_password_request("alice@example.com")
        .await
        .unwrap();
    let token = platform.last_token().unwrap();

    provider.reset_password(&token, "Fresher456").await.unwrap();
    assert_eq!(store.active_session_count(user_id), 0);

    // A second consumption is rejected by the platform and maps onto the
    // token family.
    assert_eq!(
        provider.reset_password(&token, "Another789").await.unwrap_err(),
        AuthError::InvalidToken { kind: TokenKind::PasswordReset }
    );

    assert_eq!(
        provider
            .sign_in(&credentials("alice@example.com", "Secure123"))
            .await
            .unwrap_err(),
        AuthError::InvalidCredentials
    );
    provider
        .sign_in(&credentials("alice@example.com", "Fresher456"))
        .await
        .unwrap();
}

#[tokio::test]
async fn change_password_proves_the_current_password_at_the_platform() {
    let (provider, _, _) = provider();
    let session = provider
        .sign_up(&sign_up("alice@example.com", "Secure123"))
        .await
        .unwrap();
    let user_id = session.user.id;

    assert_eq!(
        provider
            .change_password(user_id, "Wrong1234", "Fresher456")
            .await
            .unwrap_err(),
        AuthError::InvalidCredentials
    );

    provider
        .change_password(user_id, "Secure123", "Fresher456")
        .await
        .unwrap();
    provider
        .sign_in(&credentials("alice@example.com", "Fresher456"))
        .await
        .unwrap();
}

#[tokio::test]
async fn resend_verification_maps_already_confirmed() {
    let (provider, _, _) = provider();
    provider
        .sign_up(&sign_up("alice@example.com", "Secure123"))
        .await
        .unwrap();

    // Confirmed at sign-up (no confirmation requirement in this test).
    assert_eq!(
        provider
            .resend_verification("alice@example.com")
            .await
            .unwrap_err(),
        AuthError::AlreadyVerified
    );

    // Unknown address: silent.
    provider
        .resend_verification("nobody@example.com")
        .await
        .unwrap();
}

#[tokio::test]
async fn oauth_callback_delegates_to_the_platform() {
    let (provider, store, platform) = provider();
    platform.register_oauth_code("good-code", "octo@example.com", Some("Octo Cat"));

    let session = provider.handle_oauth_callback("good-code").await.unwrap();
    assert_eq!(session.user.email, "octo@example.com");
    assert_eq!(session.user.name.as_deref(), Some("Octo Cat"));

    // Mirrored like every other managed identity.
    assert!(
        store
            .get_user_by_email("octo@example.com")
            .await
            .unwrap()
            .is_some()
    );

    // A bad code is an upstream rejection mapped onto the taxonomy.
    assert_eq!(
        provider.handle_oauth_callback("bad-code").await.unwrap_err(),
        AuthError::InvalidToken { kind: TokenKind::Access }
    );
}

#[tokio::test]
async fn sign_out_revokes_the_local_session_row() {
    let (provider, store, _) = provider();
    let session = provider
        .sign_up(&sign_up("alice@example.com", "Secure123"))
        .await
        .unwrap();

    provider.sign_out(&session.tokens.refresh_token).await.unwrap();
    assert_eq!(store.active_session_count(session.user.id), 0);

    // Idempotent, like the local provider.
    provider.sign_out(&session.tokens.refresh_token).await.unwrap();
    provider.sign_out("garbage").await.unwrap();
}
