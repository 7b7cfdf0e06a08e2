use anyhow::{anyhow, ensure};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::{Result, TributeError};

pub const SESSION_ISSUER: &str = "tribute-board";
pub const SESSION_AUDIENCE: &str = "tribute-board-admin";
const ADMIN_ROLE: &str = "admin";
const INVALID_SESSION: &str = "invalid session";

#[derive(Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub secret: String,
    pub ttl_seconds: u64,
}

impl JwtConfig {
    pub fn admin_sessions(secret: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            issuer: SESSION_ISSUER.to_string(),
            audience: SESSION_AUDIENCE.to_string(),
            secret: secret.into(),
            ttl_seconds,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    role: String,
    iat: u64,
    exp: u64,
    jti: String,
    aud: String,
    iss: String,
}

/// A freshly signed admin session token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: i64,
}

/// HS256 signer for admin sessions. Only tokens carrying the admin role
/// verify.
pub struct SessionSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    ttl_seconds: u64,
}

impl SessionSigner {
    pub fn new(config: &JwtConfig) -> anyhow::Result<Self> {
        ensure!(!config.secret.is_empty(), "session secret must not be empty");
        ensure!(config.ttl_seconds > 0, "session ttl must be positive");

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl_seconds: config.ttl_seconds,
        })
    }

    pub fn issue(&self, username: &str) -> Result<IssuedSession> {
        let now = unix_seconds()?;
        let exp = now
            .checked_add(self.ttl_seconds)
            .ok_or_else(|| anyhow!("session expiry overflow"))?;
        let claims = SessionClaims {
            sub: username.to_string(),
            role: ADMIN_ROLE.to_string(),
            iat: now,
            exp,
            jti: Uuid::new_v4().to_string(),
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TributeError::backend(format!("failed to sign session: {err}")))?;
        Ok(IssuedSession {
            token,
            expires_at: i64::try_from(exp).map_err(|_| anyhow!("session expiry overflow"))?,
        })
    }

    /// Returns the username the session was issued to.
    pub fn verify(&self, token: &str) -> Result<String> {
        let claims = decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map_err(|err| {
                tracing::debug!(error = %err, "session token rejected");
                TributeError::unauthorized(INVALID_SESSION)
            })?
            .claims;
        if claims.role != ADMIN_ROLE {
            return Err(TributeError::unauthorized(INVALID_SESSION));
        }
        Ok(claims.sub)
    }
}

pub fn unix_seconds() -> anyhow::Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .map_err(|_| anyhow!("invalid system clock"))
}
