use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::error::{Result, TributeError};

pub const ANONYMOUS_NAME: &str = "Anonymous";

/// A visitor-submitted memorial entry.
///
/// `id` and `date` are assigned by the store. Only `message` changes after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tribute {
    pub id: String,
    #[serde(default = "anonymous_name")]
    pub name: String,
    pub message: String,
    #[serde(
        default,
        deserialize_with = "non_empty_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub photo_url: Option<String>,
    pub date: DateTime<Utc>,
}

/// Fields the client controls when inserting a tribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTribute {
    pub name: String,
    pub message: String,
    pub photo_url: Option<String>,
}

/// A photo attached to a submission, held in memory until uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl PhotoUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn anonymous_name() -> String {
    ANONYMOUS_NAME.to_string()
}

// Older documents store "" when no photo was attached.
fn non_empty_url<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(normalize_photo_url(value))
}

pub fn normalize_photo_url(value: Option<String>) -> Option<String> {
    value
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

pub fn validate_submission(name: &str, message: &str) -> Result<NewTribute> {
    let name = name.trim();
    let message = message.trim();
    if name.is_empty() {
        return Err(TributeError::validation("name is required"));
    }
    if message.is_empty() {
        return Err(TributeError::validation("message is required"));
    }
    Ok(NewTribute {
        name: name.to_string(),
        message: message.to_string(),
        photo_url: None,
    })
}

pub fn validate_message(message: &str) -> Result<String> {
    let message = message.trim();
    if message.is_empty() {
        return Err(TributeError::validation("message is required"));
    }
    Ok(message.to_string())
}
