use anyhow::{anyhow, Context};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::auth::unix_seconds;
use crate::blob::{encode_object_name, object_url, BlobStore};
use crate::error::{Result, TributeError};
use crate::tribute::PhotoUpload;

pub const DEFAULT_BASE_URL: &str = "https://firebasestorage.googleapis.com";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const ASSERTION_TTL_SECONDS: u64 = 3600;
const TOKEN_REFRESH_MARGIN_SECONDS: u64 = 60;
/// Bills storage calls to the service account's project.
const USER_PROJECT_HEADER: &str = "x-goog-user-project";

/// Service account identity used to mint storage access tokens.
#[derive(Clone)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key_pem: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_url: String,
    pub token_url: String,
    pub bucket: String,
    pub account: ServiceAccount,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    name: String,
    #[serde(default)]
    download_tokens: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: u64,
}

/// Firebase Storage bucket accessed over its REST API.
pub struct FirebaseStorage {
    client: Client,
    config: StorageConfig,
    signing_key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl FirebaseStorage {
    /// Fails when the private key is not a valid RSA PEM, so a bad
    /// credential is caught at startup rather than on the first upload.
    pub fn new(config: StorageConfig) -> anyhow::Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(config.account.private_key_pem.as_bytes())
            .context("invalid service account private key")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            config,
            signing_key,
            token: Mutex::new(None),
        })
    }

    fn object_endpoint(&self) -> String {
        format!(
            "{}/v0/b/{}/o",
            self.config.base_url.trim_end_matches('/'),
            self.config.bucket
        )
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        let now = unix_seconds()?;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > now + TOKEN_REFRESH_MARGIN_SECONDS {
                return Ok(token.value.clone());
            }
        }

        let claims = AssertionClaims {
            iss: &self.config.account.client_email,
            scope: STORAGE_SCOPE,
            aud: &self.config.token_url,
            iat: now,
            exp: now + ASSERTION_TTL_SECONDS,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|err| anyhow!("failed to sign storage assertion: {err}"))?;

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TributeError::backend(format!(
                "token exchange returned status {}",
                response.status()
            )));
        }
        let token: TokenResponse = response.json().await?;
        tracing::debug!(expires_in = token.expires_in, "storage access token refreshed");

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: now + token.expires_in,
        });
        Ok(value)
    }
}

#[async_trait]
impl BlobStore for FirebaseStorage {
    async fn upload(&self, path: &str, photo: &PhotoUpload) -> Result<String> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.object_endpoint())
            .query(&[("name", path)])
            .bearer_auth(token)
            .header(USER_PROJECT_HEADER, self.config.account.project_id.as_str())
            .header(header::CONTENT_TYPE, photo.content_type.as_str())
            .body(photo.bytes.clone())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TributeError::backend(format!(
                "photo upload returned status {}",
                response.status()
            )));
        }
        let metadata: ObjectMetadata = response.json().await?;
        tracing::info!(path = %metadata.name, bytes = photo.len(), "photo uploaded");

        Ok(object_url(
            &self.config.base_url,
            &self.config.bucket,
            &metadata.name,
            metadata.download_tokens.as_deref(),
        ))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let token = self.access_token().await?;
        let url = format!("{}/{}", self.object_endpoint(), encode_object_name(path));
        let response = self
            .client
            .delete(url)
            .bearer_auth(token)
            .header(USER_PROJECT_HEADER, self.config.account.project_id.as_str())
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                tracing::debug!(path = path, "photo already gone");
                Ok(())
            }
            status => Err(TributeError::backend(format!(
                "photo delete returned status {status}"
            ))),
        }
    }
}
