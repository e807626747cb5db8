//! Access and refresh token issuance.
//!
//! Access tokens are signed, stateless JWTs (HS256) carrying subject id,
//! email, the issuing provider tag, and expiry — enough to authenticate a
//! request without a storage round trip. Refresh tokens are opaque random
//! values persisted only as a SHA-256 digest on a session row, so they can
//! be revoked server-side instantly.

use crate::error::{AuthError, Result};
use crate::types::{ProviderKind, TokenKind, User, UserId};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: user id.
    pub sub: String,

    /// Email address at issue time.
    pub email: String,

    /// Issuing provider tag (`local` or `managed`).
    pub provider: String,

    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Expiry (unix seconds).
    pub exp: i64,
}

impl AccessClaims {
    /// Parse the subject claim into a [`UserId`].
    ///
    /// # Errors
    ///
    /// Returns an invalid-token error if the subject is not a UUID.
    pub fn user_id(&self) -> Result<UserId> {
        self.sub
            .parse()
            .map(UserId)
            .map_err(|_| AuthError::InvalidToken { kind: TokenKind::Access })
    }
}

/// Signs and verifies access tokens and mints opaque refresh tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: i64,
}

impl TokenIssuer {
    /// Create an issuer from a shared HS256 secret.
    #[must_use]
    pub fn new(secret: &str, access_ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
        }
    }

    /// Issue a signed access token for `user`, tagged with the issuing
    /// provider. Returns the token and its expiry.
    ///
    /// # Errors
    ///
    /// Returns error if signing fails.
    pub fn issue_access_token(
        &self,
        user: &User,
        provider: ProviderKind,
    ) -> Result<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.access_ttl_secs);
        let claims = AccessClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            provider: provider.as_str().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Provider(format!("access token signing failed: {e}")))?;
        // Round the expiry to whole seconds so it matches the claim exactly.
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or(expires_at);
        Ok((token, expires_at))
    }

    /// Verify signature, expiry, and the issuing-provider tag.
    ///
    /// A token minted by one provider must never validate against another
    /// provider's verification path; a tag mismatch is a distinct
    /// [`AuthError::ProviderMismatch`], not a generic invalid-token error.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenExpired`] past expiry,
    /// [`AuthError::ProviderMismatch`] on a cross-provider token, and
    /// [`AuthError::InvalidToken`] for anything else.
    pub fn verify_access_token(
        &self,
        token: &str,
        expected: ProviderKind,
    ) -> Result<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<AccessClaims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AuthError::TokenExpired { kind: TokenKind::Access }
                }
                _ => AuthError::InvalidToken { kind: TokenKind::Access },
            }
        })?;

        if data.claims.provider != expected.as_str() {
            return Err(AuthError::ProviderMismatch {
                expected: expected.as_str().to_string(),
                actual: data.claims.provider,
            });
        }

        Ok(data.claims)
    }
}

/// Mint an opaque refresh token: 256 bits of OS randomness, URL-safe base64.
#[must_use]
pub fn new_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Mint a one-shot token (password reset / email verification).
///
/// Same material as a refresh token; kept separate so call sites read as
/// what they are.
#[must_use]
pub fn new_one_shot_token() -> String {
    new_refresh_token()
}

/// SHA-256 digest (lowercase hex) used to store token values at rest.
#[must_use]
pub fn token_digest(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User::new("alice@example.com", Some("Alice".to_string()))
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let issuer = TokenIssuer::new("test-secret", 900);
        let user = test_user();

        let (token, expires_at) = issuer
            .issue_access_token(&user, ProviderKind::Local)
            .unwrap();
        let claims = issuer
            .verify_access_token(&token, ProviderKind::Local)
            .unwrap();

        assert_eq!(claims.user_id().unwrap(), user.id);
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.provider, "local");
        assert_eq!(claims.exp, expires_at.timestamp());
    }

    #[test]
    fn test_cross_provider_token_is_rejected_explicitly() {
        let issuer = TokenIssuer::new("test-secret", 900);
        let user = test_user();

        let (token, _) = issuer
            .issue_access_token(&user, ProviderKind::Local)
            .unwrap();
        let err = issuer
            .verify_access_token(&token, ProviderKind::Managed)
            .unwrap_err();

        assert_eq!(
            err,
            AuthError::ProviderMismatch {
                expected: "managed".to_string(),
                actual: "local".to_string(),
            }
        );
    }

    #[test]
    fn test_tampered_token_is_invalid() {
        let issuer = TokenIssuer::new("test-secret", 900);
        let other = TokenIssuer::new("other-secret", 900);
        let user = test_user();

        let (token, _) = other
            .issue_access_token(&user, ProviderKind::Local)
            .unwrap();
        assert_eq!(
            issuer.verify_access_token(&token, ProviderKind::Local),
            Err(AuthError::InvalidToken { kind: TokenKind::Access })
        );
        assert_eq!(
            issuer.verify_access_token("garbage", ProviderKind::Local),
            Err(AuthError::InvalidToken { kind: TokenKind::Access })
        );
    }

    #[test]
    fn test_expired_token_reports_expiry() {
        let issuer = TokenIssuer::new("test-secret", -60);
        let user = test_user();

        let (token, _) = issuer
            .issue_access_token(&user, ProviderKind::Local)
            .unwrap();
        assert_eq!(
            issuer.verify_access_token(&token, ProviderKind::Local),
            Err(AuthError::TokenExpired { kind: TokenKind::Access })
        );
    }

    #[test]
    fn test_refresh_tokens_are_unique_and_opaque() {
        let a = new_refresh_token();
        let b = new_refresh_token();

        assert_ne!(a, b);
        // 32 bytes → 43 chars of unpadded base64
        assert_eq!(a.len(), 43);
        assert!(!a.contains('='));
    }

    #[test]
    fn test_token_digest_is_stable_hex() {
        let digest = token_digest("some-token");
        assert_eq!(digest, token_digest("some-token"));
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(digest, token_digest("other-token"));
    }
}
