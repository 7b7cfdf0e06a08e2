use anyhow::anyhow;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;

use crate::auth::{JwtConfig, SessionSigner};
use crate::error::{Result, TributeError};

const INVALID_CREDENTIALS: &str = "invalid credentials";

/// An authenticated admin session, carried by the client as a bearer token
/// or cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub token: String,
    pub username: String,
    pub expires_at: i64,
}

/// Decides who may use the admin surface.
///
/// Login checks the configured username and an argon2 password hash and
/// issues a signed session. The legacy shared `authKey` is still honoured by
/// the delete endpoint.
pub struct AdminGate {
    username: String,
    password_hash: String,
    shared_secret: String,
    sessions: SessionSigner,
}

impl AdminGate {
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        shared_secret: impl Into<String>,
        sessions: JwtConfig,
    ) -> anyhow::Result<Self> {
        let password_hash = password_hash.into();
        PasswordHash::new(&password_hash)
            .map_err(|err| anyhow!("ADMIN_PASSWORD_HASH is not a valid hash: {err}"))?;
        let shared_secret = shared_secret.into();
        if shared_secret.is_empty() {
            return Err(anyhow!("admin shared secret must not be empty"));
        }
        Ok(Self {
            username: username.into(),
            password_hash,
            shared_secret,
            sessions: SessionSigner::new(&sessions)?,
        })
    }

    pub fn login(&self, username: &str, password: &str) -> Result<AdminSession> {
        let username_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        // Always verify so a wrong username costs the same as a wrong password.
        let password_ok = verify_password(password, &self.password_hash)?;
        if !(username_ok && password_ok) {
            tracing::warn!(username = username, "admin login rejected");
            return Err(TributeError::unauthorized(INVALID_CREDENTIALS));
        }

        let issued = self.sessions.issue(&self.username)?;
        tracing::info!(username = %self.username, "admin session issued");
        Ok(AdminSession {
            token: issued.token,
            username: self.username.clone(),
            expires_at: issued.expires_at,
        })
    }

    /// Returns the admin username the token was issued to.
    pub fn verify_session(&self, token: &str) -> Result<String> {
        let username = self.sessions.verify(token)?;
        if username != self.username {
            return Err(TributeError::unauthorized("invalid session"));
        }
        Ok(username)
    }

    pub fn shared_secret_matches(&self, candidate: &str) -> bool {
        constant_time_eq(candidate.as_bytes(), self.shared_secret.as_bytes())
    }
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    if password.is_empty() {
        return Err(anyhow!("password is required"));
    }
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("argon2 hash failed: {}", err))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|err| TributeError::backend(format!("stored password hash is invalid: {err}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
