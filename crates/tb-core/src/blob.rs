use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::error::{Result, TributeError};
use crate::tribute::PhotoUpload;

pub const PHOTO_PREFIX: &str = "tributes";
const OBJECT_MARKER: &str = "/o/";
const MAX_FILE_STEM_CHARS: usize = 80;

/// Object names are sent as a single path segment, so `/` must be escaped.
const OBJECT_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Object storage for tribute photos.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the photo at `path` and returns a publicly retrievable URL.
    async fn upload(&self, path: &str, photo: &PhotoUpload) -> Result<String>;
    /// Deleting a path that does not exist succeeds.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Builds a collision-resistant object path from the original file name.
pub fn object_path(file_name: &str, now: DateTime<Utc>) -> String {
    let sanitized: String = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_STEM_CHARS)
        .collect();
    let sanitized = sanitized.trim_matches('.');
    let stem = if sanitized.is_empty() { "photo" } else { sanitized };
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "{PHOTO_PREFIX}/{stem}-{}-{}",
        now.timestamp_millis(),
        &nonce[..8]
    )
}

pub fn encode_object_name(path: &str) -> String {
    utf8_percent_encode(path, OBJECT_NAME).to_string()
}

/// Public download URL in the `{base}/v0/b/{bucket}/o/{encoded path}` shape.
pub fn object_url(base_url: &str, bucket: &str, path: &str, token: Option<&str>) -> String {
    let mut url = format!(
        "{}/v0/b/{}/o/{}?alt=media",
        base_url.trim_end_matches('/'),
        bucket,
        encode_object_name(path)
    );
    if let Some(token) = token.filter(|token| !token.is_empty()) {
        url.push_str("&token=");
        url.push_str(&encode_object_name(token));
    }
    url
}

/// Recovers the storage path from a download URL: the percent-decoded
/// segment between `/o/` and the query string. Returns `None` for URLs that
/// do not follow that shape.
pub fn storage_path_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once(OBJECT_MARKER)?;
    let encoded = rest.split(['?', '#']).next().unwrap_or_default();
    if encoded.is_empty() {
        return None;
    }
    let decoded = percent_decode_str(encoded).decode_utf8().ok()?;
    let decoded = decoded.trim();
    if decoded.is_empty() {
        return None;
    }
    Some(decoded.to_string())
}

/// Bucket kept in process memory. URLs use the same shape as the hosted
/// service so path recovery behaves identically.
pub struct MemoryBlobStore {
    base_url: String,
    bucket: String,
    objects: Mutex<HashMap<String, PhotoUpload>>,
    delete_calls: Mutex<Vec<String>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://storage", "local")
    }
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bucket: bucket.into(),
            objects: Mutex::new(HashMap::new()),
            delete_calls: Mutex::new(Vec::new()),
            fail_uploads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    pub fn object_count(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Every path passed to `delete`, in call order.
    pub fn delete_calls(&self) -> Vec<String> {
        self.delete_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, photo: &PhotoUpload) -> Result<String> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(TributeError::backend("upload rejected"));
        }
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), photo.clone());
        Ok(object_url(&self.base_url, &self.bucket, path, None))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.delete_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(TributeError::backend("delete rejected"));
        }
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_sanitizes_and_stamps_the_name() {
        let now: DateTime<Utc> = "2025-10-16T08:00:00Z".parse().unwrap();
        let path = object_path("../my photo (1).JPG", now);
        let expected_prefix = format!("tributes/my_photo__1_.JPG-{}-", now.timestamp_millis());
        assert!(path.starts_with(&expected_prefix), "{path}");
        assert_eq!(path.len(), expected_prefix.len() + 8);
    }

    #[test]
    fn object_path_falls_back_for_empty_names() {
        let now = Utc::now();
        assert!(object_path("", now).starts_with("tributes/photo-"));
        assert!(object_path("...", now).starts_with("tributes/photo-"));
    }

    #[test]
    fn same_name_at_same_instant_does_not_collide() {
        let now = Utc::now();
        assert_ne!(object_path("a.png", now), object_path("a.png", now));
    }

    #[test]
    fn storage_path_is_recovered_from_download_urls() {
        let url = "https://firebasestorage.googleapis.com/v0/b/demo.appspot.com/o/tributes%2Fasha.png-1700000000000?alt=media&token=abc";
        assert_eq!(
            storage_path_from_url(url).as_deref(),
            Some("tributes/asha.png-1700000000000")
        );
    }

    #[test]
    fn object_url_and_path_recovery_agree() {
        let path = "tributes/rest well.png-1-deadbeef";
        let url = object_url("https://storage.test/", "bucket", path, Some("tok"));
        assert_eq!(
            url,
            "https://storage.test/v0/b/bucket/o/tributes%2Frest%20well.png-1-deadbeef?alt=media&token=tok"
        );
        assert_eq!(storage_path_from_url(&url).as_deref(), Some(path));
    }

    #[test]
    fn malformed_urls_yield_no_path() {
        assert_eq!(storage_path_from_url("not a url"), None);
        assert_eq!(storage_path_from_url("https://cdn.example.com/images/a.png"), None);
        assert_eq!(storage_path_from_url("https://x/o/?alt=media"), None);
        assert_eq!(storage_path_from_url("https://x/o/%FF%FE?alt=media"), None);
    }

    #[tokio::test]
    async fn memory_store_records_deletes() {
        let store = MemoryBlobStore::default();
        let photo = PhotoUpload::new("a.png", "image/png", vec![1u8, 2, 3]);
        let url = store.upload("tributes/a.png-1-x", &photo).await.unwrap();
        assert!(store.contains("tributes/a.png-1-x"));
        assert_eq!(storage_path_from_url(&url).as_deref(), Some("tributes/a.png-1-x"));

        store.delete("tributes/a.png-1-x").await.unwrap();
        assert!(!store.contains("tributes/a.png-1-x"));
        assert_eq!(store.delete_calls(), vec!["tributes/a.png-1-x".to_string()]);
    }
}
