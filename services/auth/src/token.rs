//! Token service for access/refresh token issuance and verification
//!
//! Stateless HS256 signing with two independent secrets: compromise of
//! the access secret must not grant refresh capability, and vice versa.
//! Verification here is purely cryptographic; whether the referenced
//! session is still alive is the orchestrator's concern.

use anyhow::Result;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::AuthUser;

/// Access token lifetime: 15 minutes, fixed by design
pub const ACCESS_TOKEN_TTL_SECS: u64 = 15 * 60;
/// Refresh token and session lifetime: 7 days, fixed by design
pub const REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

const ISSUER: &str = "worklane-auth";
const AUDIENCE: &str = "worklane-api";

/// Token signing configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Secret for signing/verifying access tokens
    pub access_secret: String,
    /// Secret for signing/verifying refresh tokens; must differ from the
    /// access secret
    pub refresh_secret: String,
}

impl TokenConfig {
    /// Create a new TokenConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: Access token signing secret
    /// - `JWT_REFRESH_SECRET`: Refresh token signing secret
    pub fn from_env() -> Result<Self> {
        let access_secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;
        let refresh_secret = std::env::var("JWT_REFRESH_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_REFRESH_SECRET environment variable not set"))?;

        if access_secret == refresh_secret {
            anyhow::bail!("JWT_SECRET and JWT_REFRESH_SECRET must be different");
        }

        Ok(TokenConfig {
            access_secret,
            refresh_secret,
        })
    }
}

/// Claims carried by an access token
///
/// Stateless: never looked up in the store. An authorization decision
/// additionally requires the referenced session to still exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub uid: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Uuid,
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
    pub aud: String,
}

/// Claims carried by a refresh token
///
/// Always checked against the stored session before trust is extended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub uid: Uuid,
    #[serde(rename = "sessionId")]
    pub session_id: Uuid,
    #[serde(rename = "tokenFamily")]
    pub token_family: Uuid,
    pub iat: u64,
    pub exp: u64,
}

/// Token service
#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    access_validation: Validation,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    refresh_validation: Validation,
}

impl TokenService {
    /// Initialize a new token service
    pub fn new(config: TokenConfig) -> Self {
        let mut access_validation = Validation::new(Algorithm::HS256);
        access_validation.set_issuer(&[ISSUER]);
        access_validation.set_audience(&[AUDIENCE]);

        let mut refresh_validation = Validation::new(Algorithm::HS256);
        refresh_validation.validate_aud = false;

        TokenService {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            access_validation,
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_validation,
        }
    }

    /// Sign an access token for a user bound to a session
    pub fn issue_access_token(&self, user: &AuthUser, session_id: Uuid) -> Result<String> {
        let now = Utc::now().timestamp() as u64;

        let claims = AccessClaims {
            uid: user.uid,
            email: user.email.clone(),
            roles: user.role_names(),
            permissions: user.permissions.clone(),
            session_id,
            iat: now,
            exp: now + ACCESS_TOKEN_TTL_SECS,
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.access_encoding,
        )?;
        Ok(token)
    }

    /// Sign a refresh token bound to a session and its token family
    pub fn issue_refresh_token(
        &self,
        uid: Uuid,
        session_id: Uuid,
        token_family: Uuid,
    ) -> Result<String> {
        let now = Utc::now().timestamp() as u64;

        let claims = RefreshClaims {
            uid,
            session_id,
            token_family,
            iat: now,
            exp: now + REFRESH_TOKEN_TTL_SECS,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.refresh_encoding,
        )?;
        Ok(token)
    }

    /// Verify an access token
    ///
    /// Fails with `InvalidToken` on a bad signature, malformed payload,
    /// wrong issuer/audience, or expiry — nothing else.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        decode::<AccessClaims>(token, &self.access_decoding, &self.access_validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }

    /// Verify a refresh token
    ///
    /// Fails with `InvalidRefreshToken` on any cryptographic or shape
    /// failure; session-level checks happen in the orchestrator.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        decode::<RefreshClaims>(token, &self.refresh_decoding, &self.refresh_validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidRefreshToken)
    }
}
