//! In-memory credential store.
//!
//! Same contract as the PostgreSQL store; each method takes the single
//! lock once, which gives the same atomicity the real store gets from
//! transactions and single-statement updates.

use crate::config::PersistedSettings;
use crate::error::{AuthError, Result};
use crate::store::{CredentialStore, LocalCredential, NewSession, OneShotToken};
use crate::types::{Session, SessionId, TokenKind, User, UserId};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    platform_ids: HashMap<String, UserId>,
    credentials: HashMap<UserId, LocalCredential>,
    sessions: HashMap<SessionId, Session>,
    tokens: HashMap<(TokenKind, String), OneShotToken>,
    settings: Option<PersistedSettings>,
}

impl Inner {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        let email = email.trim().to_lowercase();
        self.users.values().find(|u| u.email == email)
    }
}

/// In-memory credential store for tests.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of session rows (active and retired), for assertions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Number of *active* sessions for a user, for assertions.
    #[must_use]
    pub fn active_session_count(&self, user_id: UserId) -> usize {
        self.lock()
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active)
            .count()
    }

    /// Directly mutate a stored user (e.g. ban it) in tests.
    ///
    /// # Panics
    ///
    /// Panics if the user does not exist.
    pub fn with_user_mut(&self, id: UserId, f: impl FnOnce(&mut User)) {
        let mut inner = self.lock();
        let user = inner.users.get_mut(&id).expect("user exists");
        f(user);
    }

    /// Directly mutate a stored session (e.g. age it) in tests.
    ///
    /// # Panics
    ///
    /// Panics if the session does not exist.
    pub fn with_session_mut(&self, id: SessionId, f: impl FnOnce(&mut Session)) {
        let mut inner = self.lock();
        let session = inner.sessions.get_mut(&id).expect("session exists");
        f(session);
    }

    /// Directly mutate a stored credential (e.g. expire a lockout) in
    /// tests.
    ///
    /// # Panics
    ///
    /// Panics if the credential does not exist.
    pub fn with_credential_mut(&self, user_id: UserId, f: impl FnOnce(&mut LocalCredential)) {
        let mut inner = self.lock();
        let credential = inner.credentials.get_mut(&user_id).expect("credential exists");
        f(credential);
    }

    /// Directly mutate a stored one-shot token (e.g. expire it) in tests.
    ///
    /// # Panics
    ///
    /// Panics if the token does not exist.
    pub fn with_token_mut(
        &self,
        purpose: TokenKind,
        token_hash: &str,
        f: impl FnOnce(&mut OneShotToken),
    ) {
        let mut inner = self.lock();
        let token = inner
            .tokens
            .get_mut(&(purpose, token_hash.to_string()))
            .expect("token exists");
        f(token);
    }
}

impl CredentialStore for MemoryCredentialStore {
    async fn create_user(&self, user: &User) -> Result<User> {
        let mut inner = self.lock();
        if inner.user_by_email(&user.email).is_some() {
            return Err(AuthError::UserAlreadyExists);
        }
        inner.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn create_user_with_credential(&self, user: &User, password_hash: &str) -> Result<User> {
        let mut inner = self.lock();
        if inner.user_by_email(&user.email).is_some() {
            return Err(AuthError::UserAlreadyExists);
        }
        inner.users.insert(user.id, user.clone());
        inner.credentials.insert(
            user.id,
            LocalCredential {
                user_id: user.id,
                password_hash: password_hash.to_string(),
                failed_attempts: 0,
                locked_until: None,
                updated_at: user.created_at,
            },
        );
        Ok(user.clone())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.lock().user_by_email(email).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        let mut inner = self.lock();
        if !inner.users.contains_key(&user.id) {
            return Err(AuthError::storage("user not found for update"));
        }
        let mut updated = user.clone();
        updated.updated_at = Utc::now();
        inner.users.insert(user.id, updated.clone());
        Ok(updated)
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        let mut inner = self.lock();
        inner.users.remove(&id);
        inner.credentials.remove(&id);
        inner.sessions.retain(|_, s| s.user_id != id);
        inner.tokens.retain(|_, t| t.user_id != id);
        inner.platform_ids.retain(|_, uid| *uid != id);
        Ok(())
    }

    async fn upsert_platform_user(&self, platform_user_id: &str, user: &User) -> Result<User> {
        let mut inner = self.lock();
        if let Some(existing_id) = inner.platform_ids.get(platform_user_id).copied() {
            let existing = inner
                .users
                .get_mut(&existing_id)
                .ok_or_else(|| AuthError::storage("mirror row vanished"))?;
            existing.email = user.email.clone();
            existing.name = user.name.clone();
            existing.avatar_url = user.avatar_url.clone();
            existing.email_verified = user.email_verified;
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }

        if inner.user_by_email(&user.email).is_some() {
            return Err(AuthError::UserAlreadyExists);
        }
        inner.users.insert(user.id, user.clone());
        inner
            .platform_ids
            .insert(platform_user_id.to_string(), user.id);
        Ok(user.clone())
    }

    async fn get_credential(&self, user_id: UserId) -> Result<Option<LocalCredential>> {
        Ok(self.lock().credentials.get(&user_id).cloned())
    }

    async fn set_password_hash(
        &self,
        user_id: UserId,
        password_hash: &str,
        revoke_sessions: bool,
    ) -> Result<()> {
        let mut inner = self.lock();
        let credential = inner
            .credentials
            .get_mut(&user_id)
            .ok_or_else(|| AuthError::storage("credential not found"))?;
        credential.password_hash = password_hash.to_string();
        credential.failed_attempts = 0;
        credential.locked_until = None;
        credential.updated_at = Utc::now();

        if revoke_sessions {
            for session in inner.sessions.values_mut() {
                if session.user_id == user_id {
                    session.is_active = false;
                }
            }
        }
        Ok(())
    }

    async fn record_login_failure(
        &self,
        user_id: UserId,
        threshold: i32,
        lockout: Duration,
    ) -> Result<LocalCredential> {
        let mut inner = self.lock();
        let credential = inner
            .credentials
            .get_mut(&user_id)
            .ok_or_else(|| AuthError::storage("credential not found"))?;
        credential.failed_attempts += 1;
        if credential.failed_attempts >= threshold {
            credential.locked_until = Some(Utc::now() + lockout);
        }
        credential.updated_at = Utc::now();
        Ok(credential.clone())
    }

    async fn clear_login_failures(&self, user_id: UserId) -> Result<()> {
        let mut inner = self.lock();
        if let Some(credential) = inner.credentials.get_mut(&user_id) {
            credential.failed_attempts = 0;
            credential.locked_until = None;
            credential.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: UserId) -> Result<()> {
        let mut inner = self.lock();
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.email_verified = true;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_session(&self, session: &NewSession) -> Result<Session> {
        let mut inner = self.lock();
        let row = Session {
            id: SessionId::new(),
            user_id: session.user_id,
            issued_at: Utc::now(),
            expires_at: session.expires_at,
            is_active: true,
            refresh_token_hash: session.refresh_token_hash.clone(),
            provider: session.provider,
            platform_refresh_token: session.platform_refresh_token.clone(),
        };
        inner.sessions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_session_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<Session>> {
        Ok(self
            .lock()
            .sessions
            .values()
            .find(|s| s.refresh_token_hash == refresh_token_hash)
            .cloned())
    }

    async fn rotate_session(&self, retired: SessionId, next: &NewSession) -> Result<Session> {
        let mut inner = self.lock();

        // Exactly one concurrent rotation of the same session wins.
        match inner.sessions.get_mut(&retired) {
            Some(session) if session.is_active => session.is_active = false,
            _ => return Err(AuthError::InvalidToken { kind: TokenKind::Refresh }),
        }

        let row = Session {
            id: SessionId::new(),
            user_id: next.user_id,
            issued_at: Utc::now(),
            expires_at: next.expires_at,
            is_active: true,
            refresh_token_hash: next.refresh_token_hash.clone(),
            provider: next.provider,
            platform_refresh_token: next.platform_refresh_token.clone(),
        };
        inner.sessions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn deactivate_session(&self, id: SessionId) -> Result<()> {
        let mut inner = self.lock();
        if let Some(session) = inner.sessions.get_mut(&id) {
            session.is_active = false;
        }
        Ok(())
    }

    async fn deactivate_session_by_refresh_hash(&self, refresh_token_hash: &str) -> Result<()> {
        let mut inner = self.lock();
        for session in inner.sessions.values_mut() {
            if session.refresh_token_hash == refresh_token_hash {
                session.is_active = false;
            }
        }
        Ok(())
    }

    async fn revoke_user_sessions(&self, user_id: UserId) -> Result<u64> {
        let mut inner = self.lock();
        let mut revoked = 0;
        for session in inner.sessions.values_mut() {
            if session.user_id == user_id && session.is_active {
                session.is_active = false;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn create_one_shot_token(&self, token: &OneShotToken) -> Result<()> {
        self.lock()
            .tokens
            .insert((token.purpose, token.token_hash.clone()), token.clone());
        Ok(())
    }

    async fn consume_one_shot_token(
        &self,
        purpose: TokenKind,
        token_hash: &str,
    ) -> Result<Option<OneShotToken>> {
        let consumed = self
            .lock()
            .tokens
            .remove(&(purpose, token_hash.to_string()));

        Ok(consumed.filter(|t| t.expires_at > Utc::now()))
    }

    async fn load_settings(&self) -> Result<Option<PersistedSettings>> {
        Ok(self.lock().settings.clone())
    }

    async fn save_settings(&self, settings: &PersistedSettings) -> Result<()> {
        self.lock().settings = Some(settings.clone());
        Ok(())
    }
}
