//! Behavioral fake of the managed identity platform.
//!
//! Emulates just enough of a GoTrue-style platform for integration tests:
//! registration, password checks, refresh-token rotation, recovery and
//! confirmation tokens, and the platform's characteristic error strings.

use crate::platform::{IdentityPlatform, PlatformError, PlatformSession, PlatformUser};
use crate::types::OAuthProviderKind;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone)]
struct MockUser {
    id: String,
    password: String,
    confirmed: bool,
    name: Option<String>,
}

#[derive(Default)]
struct State {
    users: HashMap<String, MockUser>,
    refresh_tokens: HashMap<String, String>,
    access_tokens: HashMap<String, String>,
    one_shot: HashMap<String, (String, String)>,
    oauth_codes: HashMap<String, String>,
    confirmation_required: bool,
    counter: u64,
    last_token: Option<String>,
}

/// Scriptable in-memory identity platform.
#[derive(Clone, Default)]
pub struct MockIdentityPlatform {
    state: Arc<Mutex<State>>,
}

impl MockIdentityPlatform {
    /// Create an empty platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require email confirmation: sign-up returns no session and sign-in
    /// fails with "Email not confirmed" until the token is consumed.
    #[must_use]
    pub fn with_confirmation_required(self) -> Self {
        self.lock().confirmation_required = true;
        self
    }

    /// The most recent one-shot (recovery/confirmation) token the platform
    /// "sent".
    #[must_use]
    pub fn last_token(&self) -> Option<String> {
        self.lock().last_token.clone()
    }

    /// Register an OAuth callback code resolving to `email`.
    pub fn register_oauth_code(&self, code: &str, email: &str, name: Option<&str>) {
        let mut state = self.lock();
        let email = email.to_lowercase();
        if !state.users.contains_key(&email) {
            state.counter += 1;
            let user = MockUser {
                id: format!("platform-user-{}", state.counter),
                password: String::new(),
                confirmed: true,
                name: name.map(str::to_string),
            };
            state.users.insert(email.clone(), user);
        }
        state.oauth_codes.insert(code.to_string(), email);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn platform_user(email: &str, user: &MockUser) -> PlatformUser {
    PlatformUser {
        id: user.id.clone(),
        email: email.to_string(),
        email_confirmed: user.confirmed,
        name: user.name.clone(),
        avatar_url: None,
    }
}

fn open_session(state: &mut State, email: &str) -> PlatformSession {
    state.counter += 1;
    let access = format!("platform-access-{}", state.counter);
    let refresh = format!("platform-refresh-{}", state.counter);
    state.access_tokens.insert(access.clone(), email.to_string());
    state
        .refresh_tokens
        .insert(refresh.clone(), email.to_string());

    let user = state.users[email].clone();
    PlatformSession {
        user: platform_user(email, &user),
        access_token: Some(access),
        refresh_token: Some(refresh),
    }
}

fn issue_one_shot(state: &mut State, kind: &str, email: &str) -> String {
    state.counter += 1;
    let token = format!("{kind}-token-{}", state.counter);
    state
        .one_shot
        .insert(token.clone(), (kind.to_string(), email.to_string()));
    state.last_token = Some(token.clone());
    token
}

fn rejected(message: &str) -> PlatformError {
    PlatformError::Rejected { message: message.to_string() }
}

impl IdentityPlatform for MockIdentityPlatform {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<PlatformSession, PlatformError> {
        let mut state = self.lock();
        let email = email.to_lowercase();
        if state.users.contains_key(&email) {
            return Err(rejected("User already registered"));
        }

        state.counter += 1;
        let user = MockUser {
            id: format!("platform-user-{}", state.counter),
            password: password.to_string(),
            confirmed: !state.confirmation_required,
            name: None,
        };
        state.users.insert(email.clone(), user.clone());

        if state.confirmation_required {
            issue_one_shot(&mut state, "signup", &email);
            return Ok(PlatformSession {
                user: platform_user(&email, &user),
                access_token: None,
                refresh_token: None,
            });
        }

        Ok(open_session(&mut state, &email))
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<PlatformSession, PlatformError> {
        let mut state = self.lock();
        let email = email.to_lowercase();
        let Some(user) = state.users.get(&email).cloned() else {
            return Err(rejected("Invalid login credentials"));
        };
        if user.password != password {
            return Err(rejected("Invalid login credentials"));
        }
        if !user.confirmed {
            return Err(rejected("Email not confirmed"));
        }
        Ok(open_session(&mut state, &email))
    }

    async fn refresh(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<PlatformSession, PlatformError> {
        let mut state = self.lock();
        let Some(email) = state.refresh_tokens.remove(refresh_token) else {
            return Err(rejected("Invalid Refresh Token: Refresh Token Not Found"));
        };
        Ok(open_session(&mut state, &email))
    }

    async fn exchange_code(
        &self,
        code: &str,
    ) -> std::result::Result<PlatformSession, PlatformError> {
        let mut state = self.lock();
        let Some(email) = state.oauth_codes.remove(code) else {
            return Err(rejected("Invalid token: flow state not found"));
        };
        Ok(open_session(&mut state, &email))
    }

    fn authorize_url(
        &self,
        provider: OAuthProviderKind,
        redirect_to: &str,
        state: &str,
    ) -> std::result::Result<String, PlatformError> {
        Ok(format!(
            "https://platform.mock/auth/v1/authorize?provider={}&redirect_to={redirect_to}&state={state}",
            provider.as_str()
        ))
    }

    async fn recover(&self, email: &str) -> std::result::Result<(), PlatformError> {
        let mut state = self.lock();
        let email = email.to_lowercase();
        if !state.users.contains_key(&email) {
            return Err(rejected("User not found"));
        }
        issue_one_shot(&mut state, "recovery", &email);
        Ok(())
    }

    async fn resend_verification(&self, email: &str) -> std::result::Result<(), PlatformError> {
        let mut state = self.lock();
        let email = email.to_lowercase();
        let Some(user) = state.users.get(&email).cloned() else {
            return Err(rejected("User not found"));
        };
        if user.confirmed {
            return Err(rejected("User already confirmed"));
        }
        issue_one_shot(&mut state, "signup", &email);
        Ok(())
    }

    async fn verify(
        &self,
        kind: &str,
        token: &str,
    ) -> std::result::Result<PlatformSession, PlatformError> {
        let mut state = self.lock();
        let Some((stored_kind, email)) = state.one_shot.remove(token) else {
            return Err(rejected("Token has expired or is invalid"));
        };
        if stored_kind != kind {
            return Err(rejected("Token has expired or is invalid"));
        }
        if kind == "signup" {
            if let Some(user) = state.users.get_mut(&email) {
                user.confirmed = true;
            }
        }
        Ok(open_session(&mut state, &email))
    }

    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> std::result::Result<(), PlatformError> {
        let mut state = self.lock();
        let Some(email) = state.access_tokens.get(access_token).cloned() else {
            return Err(rejected("Invalid token"));
        };
        if let Some(user) = state.users.get_mut(&email) {
            user.password = new_password.to_string();
        }
        Ok(())
    }
}
