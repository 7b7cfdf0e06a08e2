use chrono::Utc;
use std::sync::Arc;

use crate::blob::{object_path, storage_path_from_url, BlobStore};
use crate::error::{Result, TributeError};
use crate::feed::{FeedReceiver, Snapshot, Subscription, TributeFeed};
use crate::metrics;
use crate::store::TributeStore;
use crate::tribute::{normalize_photo_url, validate_message, validate_submission, PhotoUpload, Tribute};

/// What happened to the photo when its tribute was deleted. Photo cleanup
/// never fails the delete itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobCleanup {
    NotRequested,
    Deleted(String),
    /// The URL did not contain a storage path.
    Skipped(String),
    Failed { path: String, error: String },
}

/// Entry point for everything the board and admin surfaces do with tributes.
pub struct TributeRepository {
    store: Arc<dyn TributeStore>,
    blobs: Arc<dyn BlobStore>,
    feed: TributeFeed,
}

impl TributeRepository {
    pub async fn new(store: Arc<dyn TributeStore>, blobs: Arc<dyn BlobStore>) -> Result<Self> {
        let feed = TributeFeed::start(Arc::clone(&store)).await?;
        Ok(Self { store, blobs, feed })
    }

    /// Uploads the photo, if any, then inserts the document. A failed insert
    /// leaves the uploaded photo in place.
    pub async fn create(
        &self,
        name: &str,
        message: &str,
        photo: Option<PhotoUpload>,
    ) -> Result<String> {
        let mut draft = validate_submission(name, message)?;
        let result = async {
            if let Some(photo) = photo.filter(|photo| !photo.is_empty()) {
                let path = object_path(&photo.file_name, Utc::now());
                let url = self.blobs.upload(&path, &photo).await?;
                tracing::debug!(path = %path, "tribute photo stored");
                draft.photo_url = Some(url);
            }
            self.store.insert(draft).await
        }
        .await;
        metrics::inc_mutation("create", result.is_ok());

        match result {
            Ok(tribute) => {
                tracing::info!(
                    id = %tribute.id,
                    has_photo = tribute.photo_url.is_some(),
                    "tribute created"
                );
                Ok(tribute.id)
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to create tribute");
                Err(err)
            }
        }
    }

    pub async fn update_message(&self, id: &str, message: &str) -> Result<()> {
        let message = validate_message(message)?;
        let result = self.store.update_message(id, &message).await;
        metrics::inc_mutation("update", matches!(result, Ok(true)));
        match result? {
            true => {
                tracing::info!(id = id, "tribute message updated");
                Ok(())
            }
            false => Err(TributeError::not_found(format!("tribute {id}"))),
        }
    }

    /// Removes the document, then makes one attempt at removing the photo
    /// behind `photo_url`. A missing document is not an error.
    pub async fn delete(&self, id: &str, photo_url: Option<&str>) -> Result<BlobCleanup> {
        let removed = self.store.delete(id).await;
        metrics::inc_mutation("delete", removed.is_ok());
        match removed? {
            Some(_) => tracing::info!(id = id, "tribute deleted"),
            None => tracing::debug!(id = id, "tribute already absent"),
        }
        Ok(self.remove_photo(photo_url).await)
    }

    /// Like [`delete`](Self::delete), but requires the document to exist and
    /// uses its stored photo URL.
    pub async fn delete_existing(&self, id: &str) -> Result<BlobCleanup> {
        let tribute = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| TributeError::not_found(format!("tribute {id}")))?;
        self.delete(id, tribute.photo_url.as_deref()).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Tribute>> {
        self.store.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<Tribute>> {
        self.store.list_by_date_desc().await
    }

    pub fn current(&self) -> Snapshot {
        self.feed.current()
    }

    pub fn subscribe<F>(&self, on_change: F) -> Subscription
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        self.feed.subscribe(on_change)
    }

    pub fn listen(&self) -> FeedReceiver {
        self.feed.listen()
    }

    pub async fn check_ready(&self) -> Result<()> {
        self.store.check_ready().await
    }

    pub fn shutdown(&self) {
        self.feed.shutdown();
        tracing::info!("tribute repository shut down");
    }

    async fn remove_photo(&self, photo_url: Option<&str>) -> BlobCleanup {
        let Some(url) = normalize_photo_url(photo_url.map(str::to_string)) else {
            return BlobCleanup::NotRequested;
        };
        let Some(path) = storage_path_from_url(&url) else {
            tracing::warn!(photo_url = %url, "photo url has no storage path; skipping photo delete");
            metrics::inc_blob_delete_failure("malformed_url");
            return BlobCleanup::Skipped(url);
        };
        match self.blobs.delete(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path, "tribute photo deleted");
                BlobCleanup::Deleted(path)
            }
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "failed to delete tribute photo");
                metrics::inc_blob_delete_failure("delete_failed");
                BlobCleanup::Failed {
                    path,
                    error: err.to_string(),
                }
            }
        }
    }
}
