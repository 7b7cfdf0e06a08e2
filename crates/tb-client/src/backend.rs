use async_trait::async_trait;
use std::sync::Arc;
use tb_core::admin::{AdminGate, AdminSession};
use tb_core::{PhotoUpload, Result, Snapshot, Subscription, Tribute, TributeRepository};

pub type SnapshotCallback = Box<dyn FnMut(Snapshot) + Send + 'static>;

/// Operations the public board needs.
#[async_trait]
pub trait BoardBackend: Send + Sync {
    async fn create(&self, name: &str, message: &str, photo: Option<PhotoUpload>)
        -> Result<String>;

    async fn update_message(&self, id: &str, message: &str) -> Result<()>;

    async fn delete(&self, id: &str, photo_url: Option<&str>) -> Result<()>;

    /// Delivers the current list to `on_change` before returning, then every
    /// later snapshot until the subscription is dropped.
    async fn subscribe(&self, on_change: SnapshotCallback) -> Result<Subscription>;
}

/// Operations the admin dashboard needs. Every call after `login` carries
/// the session token.
#[async_trait]
pub trait AdminBackend: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<AdminSession>;

    async fn list(&self, token: &str) -> Result<Vec<Tribute>>;

    async fn delete(&self, token: &str, id: &str) -> Result<()>;
}

#[async_trait]
impl BoardBackend for TributeRepository {
    async fn create(
        &self,
        name: &str,
        message: &str,
        photo: Option<PhotoUpload>,
    ) -> Result<String> {
        TributeRepository::create(self, name, message, photo).await
    }

    async fn update_message(&self, id: &str, message: &str) -> Result<()> {
        TributeRepository::update_message(self, id, message).await
    }

    async fn delete(&self, id: &str, photo_url: Option<&str>) -> Result<()> {
        TributeRepository::delete(self, id, photo_url).await?;
        Ok(())
    }

    async fn subscribe(&self, on_change: SnapshotCallback) -> Result<Subscription> {
        Ok(TributeRepository::subscribe(self, on_change))
    }
}

#[async_trait]
impl<T: BoardBackend + ?Sized> BoardBackend for Arc<T> {
    async fn create(
        &self,
        name: &str,
        message: &str,
        photo: Option<PhotoUpload>,
    ) -> Result<String> {
        (**self).create(name, message, photo).await
    }

    async fn update_message(&self, id: &str, message: &str) -> Result<()> {
        (**self).update_message(id, message).await
    }

    async fn delete(&self, id: &str, photo_url: Option<&str>) -> Result<()> {
        (**self).delete(id, photo_url).await
    }

    async fn subscribe(&self, on_change: SnapshotCallback) -> Result<Subscription> {
        (**self).subscribe(on_change).await
    }
}

/// Admin backend running in the same process as the repository.
pub struct LocalAdmin {
    gate: Arc<AdminGate>,
    repository: Arc<TributeRepository>,
}

impl LocalAdmin {
    pub fn new(gate: Arc<AdminGate>, repository: Arc<TributeRepository>) -> Self {
        Self { gate, repository }
    }
}

#[async_trait]
impl AdminBackend for LocalAdmin {
    async fn login(&self, username: &str, password: &str) -> Result<AdminSession> {
        self.gate.login(username, password)
    }

    async fn list(&self, token: &str) -> Result<Vec<Tribute>> {
        self.gate.verify_session(token)?;
        self.repository.list().await
    }

    async fn delete(&self, token: &str, id: &str) -> Result<()> {
        let username = self.gate.verify_session(token)?;
        let cleanup = self.repository.delete_existing(id).await?;
        tracing::info!(id = %id, admin = %username, ?cleanup, "tribute deleted by admin");
        Ok(())
    }
}
