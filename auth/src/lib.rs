//! # Opsuite Authentication
//!
//! Provider-polymorphic authentication and session lifecycle for the
//! Opsuite platform: a self-hosted password-credential provider, delegation
//! to a managed identity platform, and federated sign-in through Google,
//! GitHub, Discord, and Apple — unified behind one capability-set contract
//! so callers never need to know which mechanism authenticated a user.
//!
//! ## Architecture
//!
//! ```text
//! caller → AuthService (facade, one dispatch)
//!            ├── LocalAuthProvider ──┐
//!            ├── ManagedAuthProvider ├─→ CredentialStore (PostgreSQL)
//!            └── OAuth adapters ─────┘
//! ```
//!
//! The credential store is the single source of truth; sessions are
//! revocable rows, access tokens are stateless JWTs tagged with their
//! issuing provider, and refresh tokens rotate on every use.
//!
//! ## Example: local sign-up and sign-in
//!
//! ```rust,ignore
//! use opsuite_auth::{AuthConfig, AuthService, ConsoleMailer, SignUp};
//! use opsuite_auth::providers::AuthProvider as _;
//!
//! let service = AuthService::initialize(store, ConsoleMailer::new(), AuthConfig::from_env()?)
//!     .await?;
//!
//! let session = service
//!     .sign_up(&SignUp {
//!         email: "alice@example.com".into(),
//!         password: "Secure123".into(),
//!         name: None,
//!     })
//!     .await?;
//! assert!(!session.tokens.access_token.is_empty());
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod config;
pub mod error;
pub mod facade;
pub mod mailer;
pub mod oauth;
pub mod password;
pub mod platform;
pub mod providers;
pub mod store;
pub mod token;
pub mod types;
pub mod utils;

// Mock providers for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use config::{AuthConfig, LocalPolicy, PersistedSettings, ProviderSelection};
pub use error::{AuthError, Result};
pub use facade::AuthService;
pub use mailer::{ConsoleMailer, Mailer, SmtpMailer};
pub use oauth::{OAuthAdapter, OAuthUserInfo};
pub use password::{PasswordHasher, PasswordParams};
pub use providers::{AuthProvider, LocalAuthProvider, ManagedAuthProvider};
pub use store::{CredentialStore, PostgresCredentialStore};
pub use token::TokenIssuer;
pub use types::{
    AuthSession, Credentials, OAuthProviderKind, ProviderKind, Session, SessionId, SignUp,
    TokenKind, TokenPair, User, UserId,
};
