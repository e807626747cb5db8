//! PostgreSQL credential store implementation.
//!
//! Queries are runtime-checked (`query_as` + binds) so the crate builds
//! without a live `DATABASE_URL`. Multi-statement operations run inside
//! transactions; counters and one-shot consumption are single statements.
//!
//! # Example
//!
//! ```no_run
//! use opsuite_auth::store::PostgresCredentialStore;
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgresql://localhost/opsuite").await?;
//! let store = PostgresCredentialStore::new(pool);
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use super::{CredentialStore, LocalCredential, NewSession, OneShotToken};
use crate::config::{PersistedSettings, ProviderSelection};
use crate::error::{AuthError, Result};
use crate::types::{ProviderKind, Session, SessionId, TokenKind, User, UserId};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

/// PostgreSQL credential store.
#[derive(Clone)]
pub struct PostgresCredentialStore {
    /// PostgreSQL connection pool.
    pool: PgPool,
}

impl PostgresCredentialStore {
    /// Create a new store over an existing pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AuthError::storage(format!("migration failed: {e}")))?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: uuid::Uuid,
    email: String,
    name: Option<String>,
    avatar_url: Option<String>,
    email_verified: bool,
    banned: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId(row.id),
            email: row.email,
            name: row.name,
            avatar_url: row.avatar_url,
            email_verified: row.email_verified,
            banned: row.banned,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    user_id: uuid::Uuid,
    password_hash: String,
    failed_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<CredentialRow> for LocalCredential {
    fn from(row: CredentialRow) -> Self {
        Self {
            user_id: UserId(row.user_id),
            password_hash: row.password_hash,
            failed_attempts: row.failed_attempts,
            locked_until: row.locked_until,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: uuid::Uuid,
    user_id: uuid::Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_active: bool,
    refresh_token_hash: String,
    provider: String,
    platform_refresh_token: Option<String>,
}

impl TryFrom<SessionRow> for Session {
    type Error = AuthError;

    fn try_from(row: SessionRow) -> Result<Self> {
        let provider = ProviderKind::parse(&row.provider).map_err(AuthError::storage)?;
        Ok(Self {
            id: SessionId(row.id),
            user_id: UserId(row.user_id),
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            is_active: row.is_active,
            refresh_token_hash: row.refresh_token_hash,
            provider,
            platform_refresh_token: row.platform_refresh_token,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    user_id: uuid::Uuid,
    purpose: String,
    token_hash: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TokenRow> for OneShotToken {
    type Error = AuthError;

    fn try_from(row: TokenRow) -> Result<Self> {
        let purpose = match row.purpose.as_str() {
            "password_reset" => TokenKind::PasswordReset,
            "email_verification" => TokenKind::EmailVerification,
            other => {
                return Err(AuthError::storage(format!("unknown token purpose: {other}")));
            }
        };
        Ok(Self {
            user_id: UserId(row.user_id),
            purpose,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    active_provider: String,
    require_email_verification: bool,
    lockout_threshold: i32,
    lockout_duration_secs: i64,
    session_ttl_secs: i64,
}

fn map_insert_error(e: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AuthError::UserAlreadyExists;
        }
    }
    AuthError::storage(e)
}

const USER_COLUMNS: &str = "id, email, name, avatar_url, email_verified, banned, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, user_id, issued_at, expires_at, is_active, refresh_token_hash, provider, platform_refresh_token";

impl CredentialStore for PostgresCredentialStore {
    async fn create_user(&self, user: &User) -> Result<User> {
        sqlx::query(
            r"
            INSERT INTO users (id, email, name, avatar_url, email_verified, banned, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(user.id.0)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.avatar_url)
        .bind(user.email_verified)
        .bind(user.banned)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(user.clone())
    }

    async fn create_user_with_credential(&self, user: &User, password_hash: &str) -> Result<User> {
        let mut tx = self.pool.begin().await.map_err(AuthError::storage)?;

        sqlx::query(
            r"
            INSERT INTO users (id, email, name, avatar_url, email_verified, banned, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(user.id.0)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.avatar_url)
        .bind(user.email_verified)
        .bind(user.banned)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        sqlx::query(
            r"
            INSERT INTO local_credentials (user_id, password_hash, failed_attempts, locked_until, updated_at)
            VALUES ($1, $2, 0, NULL, $3)
            ",
        )
        .bind(user.id.0)
        .bind(password_hash)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(AuthError::storage)?;

        tx.commit().await.map_err(AuthError::storage)?;
        Ok(user.clone())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::storage)?;

        Ok(row.map(User::from))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::storage)?;

        Ok(row.map(User::from))
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            UPDATE users
            SET email = $2,
                name = $3,
                avatar_url = $4,
                email_verified = $5,
                banned = $6,
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(user.id.0)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.avatar_url)
        .bind(user.email_verified)
        .bind(user.banned)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_insert_error)?
        .ok_or_else(|| AuthError::storage("user not found for update"))?;

        Ok(User::from(row))
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        // Credentials, sessions, and one-shot tokens cascade via FK.
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(AuthError::storage)?;
        Ok(())
    }

    async fn upsert_platform_user(&self, platform_user_id: &str, user: &User) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            INSERT INTO users
                (id, email, name, avatar_url, email_verified, banned, platform_user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (platform_user_id)
            DO UPDATE SET
                email = EXCLUDED.email,
                name = EXCLUDED.name,
                avatar_url = EXCLUDED.avatar_url,
                email_verified = EXCLUDED.email_verified,
                updated_at = now()
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(user.id.0)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.avatar_url)
        .bind(user.email_verified)
        .bind(user.banned)
        .bind(platform_user_id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(User::from(row))
    }

    async fn get_credential(&self, user_id: UserId) -> Result<Option<LocalCredential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r"
            SELECT user_id, password_hash, failed_attempts, locked_until, updated_at
            FROM local_credentials
            WHERE user_id = $1
            ",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::storage)?;

        Ok(row.map(LocalCredential::from))
    }

    async fn set_password_hash(
        &self,
        user_id: UserId,
        password_hash: &str,
        revoke_sessions: bool,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AuthError::storage)?;

        sqlx::query(
            r"
            UPDATE local_credentials
            SET password_hash = $2, failed_attempts = 0, locked_until = NULL, updated_at = now()
            WHERE user_id = $1
            ",
        )
        .bind(user_id.0)
        .bind(password_hash)
        .execute(&mut *tx)
        .await
        .map_err(AuthError::storage)?;

        if revoke_sessions {
            sqlx::query("UPDATE sessions SET is_active = FALSE WHERE user_id = $1")
                .bind(user_id.0)
                .execute(&mut *tx)
                .await
                .map_err(AuthError::storage)?;
        }

        tx.commit().await.map_err(AuthError::storage)?;
        Ok(())
    }

    async fn record_login_failure(
        &self,
        user_id: UserId,
        threshold: i32,
        lockout: Duration,
    ) -> Result<LocalCredential> {
        // Increment and conditional lock in one statement: no lost updates
        // under concurrent bad-password attempts.
        let row = sqlx::query_as::<_, CredentialRow>(
            r"
            UPDATE local_credentials
            SET failed_attempts = failed_attempts + 1,
                locked_until = CASE
                    WHEN failed_attempts + 1 >= $2 THEN now() + make_interval(secs => $3)
                    ELSE locked_until
                END,
                updated_at = now()
            WHERE user_id = $1
            RETURNING user_id, password_hash, failed_attempts, locked_until, updated_at
            ",
        )
        .bind(user_id.0)
        .bind(threshold)
        .bind(lockout.num_seconds() as f64)
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::storage)?
        .ok_or_else(|| AuthError::storage("credential not found for failure update"))?;

        Ok(LocalCredential::from(row))
    }

    async fn clear_login_failures(&self, user_id: UserId) -> Result<()> {
        sqlx::query(
            r"
            UPDATE local_credentials
            SET failed_attempts = 0, locked_until = NULL, updated_at = now()
            WHERE user_id = $1
            ",
        )
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(AuthError::storage)?;
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: UserId) -> Result<()> {
        sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = now() WHERE id = $1")
            .bind(user_id.0)
            .execute(&self.pool)
            .await
            .map_err(AuthError::storage)?;
        Ok(())
    }

    async fn create_session(&self, session: &NewSession) -> Result<Session> {
        let id = SessionId::new();
        let issued_at = Utc::now();

        sqlx::query(
            r"
            INSERT INTO sessions
                (id, user_id, issued_at, expires_at, is_active, refresh_token_hash, provider, platform_refresh_token)
            VALUES ($1, $2, $3, $4, TRUE, $5, $6, $7)
            ",
        )
        .bind(id.0)
        .bind(session.user_id.0)
        .bind(issued_at)
        .bind(session.expires_at)
        .bind(&session.refresh_token_hash)
        .bind(session.provider.as_str())
        .bind(&session.platform_refresh_token)
        .execute(&self.pool)
        .await
        .map_err(AuthError::storage)?;

        Ok(Session {
            id,
            user_id: session.user_id,
            issued_at,
            expires_at: session.expires_at,
            is_active: true,
            refresh_token_hash: session.refresh_token_hash.clone(),
            provider: session.provider,
            platform_refresh_token: session.platform_refresh_token.clone(),
        })
    }

    async fn get_session_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE refresh_token_hash = $1"
        ))
        .bind(refresh_token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::storage)?;

        row.map(Session::try_from).transpose()
    }

    async fn rotate_session(&self, retired: SessionId, next: &NewSession) -> Result<Session> {
        let mut tx = self.pool.begin().await.map_err(AuthError::storage)?;

        // Only a still-active row can be retired; concurrent refreshes of
        // the same token race here and exactly one wins.
        let retired_rows = sqlx::query(
            "UPDATE sessions SET is_active = FALSE WHERE id = $1 AND is_active",
        )
        .bind(retired.0)
        .execute(&mut *tx)
        .await
        .map_err(AuthError::storage)?;

        if retired_rows.rows_affected() == 0 {
            return Err(AuthError::InvalidToken { kind: TokenKind::Refresh });
        }

        let id = SessionId::new();
        let issued_at = Utc::now();

        sqlx::query(
            r"
            INSERT INTO sessions
                (id, user_id, issued_at, expires_at, is_active, refresh_token_hash, provider, platform_refresh_token)
            VALUES ($1, $2, $3, $4, TRUE, $5, $6, $7)
            ",
        )
        .bind(id.0)
        .bind(next.user_id.0)
        .bind(issued_at)
        .bind(next.expires_at)
        .bind(&next.refresh_token_hash)
        .bind(next.provider.as_str())
        .bind(&next.platform_refresh_token)
        .execute(&mut *tx)
        .await
        .map_err(AuthError::storage)?;

        tx.commit().await.map_err(AuthError::storage)?;

        Ok(Session {
            id,
            user_id: next.user_id,
            issued_at,
            expires_at: next.expires_at,
            is_active: true,
            refresh_token_hash: next.refresh_token_hash.clone(),
            provider: next.provider,
            platform_refresh_token: next.platform_refresh_token.clone(),
        })
    }

    async fn deactivate_session(&self, id: SessionId) -> Result<()> {
        sqlx::query("UPDATE sessions SET is_active = FALSE WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(AuthError::storage)?;
        Ok(())
    }

    async fn deactivate_session_by_refresh_hash(&self, refresh_token_hash: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET is_active = FALSE WHERE refresh_token_hash = $1")
            .bind(refresh_token_hash)
            .execute(&self.pool)
            .await
            .map_err(AuthError::storage)?;
        Ok(())
    }

    async fn revoke_user_sessions(&self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET is_active = FALSE WHERE user_id = $1 AND is_active",
        )
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(AuthError::storage)?;

        Ok(result.rows_affected())
    }

    async fn create_one_shot_token(&self, token: &OneShotToken) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO one_shot_tokens (user_id, purpose, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(token.user_id.0)
        .bind(token.purpose.as_str())
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(AuthError::storage)?;
        Ok(())
    }

    async fn consume_one_shot_token(
        &self,
        purpose: TokenKind,
        token_hash: &str,
    ) -> Result<Option<OneShotToken>> {
        let row = sqlx::query_as::<_, TokenRow>(
            r"
            DELETE FROM one_shot_tokens
            WHERE purpose = $1 AND token_hash = $2
            RETURNING user_id, purpose, token_hash, expires_at, created_at
            ",
        )
        .bind(purpose.as_str())
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::storage)?;

        let Some(token) = row.map(OneShotToken::try_from).transpose()? else {
            return Ok(None);
        };

        // An expired token is consumed but reported as absent.
        if token.expires_at <= Utc::now() {
            return Ok(None);
        }

        Ok(Some(token))
    }

    async fn load_settings(&self) -> Result<Option<PersistedSettings>> {
        let row = sqlx::query_as::<_, SettingsRow>(
            r"
            SELECT active_provider, require_email_verification, lockout_threshold,
                   lockout_duration_secs, session_ttl_secs
            FROM auth_settings
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::storage)?;

        row.map(|row| {
            let active_provider =
                ProviderSelection::parse(&row.active_provider).map_err(AuthError::storage)?;
            Ok(PersistedSettings {
                active_provider,
                require_email_verification: row.require_email_verification,
                lockout_threshold: row.lockout_threshold,
                lockout_duration_secs: row.lockout_duration_secs,
                session_ttl_secs: row.session_ttl_secs,
            })
        })
        .transpose()
    }

    async fn save_settings(&self, settings: &PersistedSettings) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO auth_settings
                (id, active_provider, require_email_verification, lockout_threshold,
                 lockout_duration_secs, session_ttl_secs)
            VALUES (1, $1, $2, $3, $4, $5)
            ON CONFLICT (id)
            DO UPDATE SET
                active_provider = EXCLUDED.active_provider,
                require_email_verification = EXCLUDED.require_email_verification,
                lockout_threshold = EXCLUDED.lockout_threshold,
                lockout_duration_secs = EXCLUDED.lockout_duration_secs,
                session_ttl_secs = EXCLUDED.session_ttl_secs
            ",
        )
        .bind(settings.active_provider.as_str())
        .bind(settings.require_email_verification)
        .bind(settings.lockout_threshold)
        .bind(settings.lockout_duration_secs)
        .bind(settings.session_ttl_secs)
        .execute(&self.pool)
        .await
        .map_err(AuthError::storage)?;
        Ok(())
    }
}
