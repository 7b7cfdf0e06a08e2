use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{Result, TributeError};
use crate::tribute::{normalize_photo_url, NewTribute, Tribute};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// What changed in the collection. Delivered after the change is durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNotice {
    Added(String),
    Modified(String),
    Removed(String),
    /// The change stream was interrupted; consumers should re-read everything.
    Resync,
}

/// Document collection holding tributes.
///
/// Implementations assign `id` and `date` on insert and publish a
/// [`ChangeNotice`] for every mutation, whichever process made it.
#[async_trait]
pub trait TributeStore: Send + Sync {
    async fn insert(&self, tribute: NewTribute) -> Result<Tribute>;
    async fn get(&self, id: &str) -> Result<Option<Tribute>>;
    async fn list_by_date_desc(&self) -> Result<Vec<Tribute>>;
    /// Returns `false` when no document has this id.
    async fn update_message(&self, id: &str, message: &str) -> Result<bool>;
    /// Returns the removed document, or `None` if it did not exist.
    async fn delete(&self, id: &str) -> Result<Option<Tribute>>;
    fn changes(&self) -> broadcast::Receiver<ChangeNotice>;

    async fn check_ready(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    docs: Vec<Tribute>,
    last_date: Option<DateTime<Utc>>,
}

/// Process-local store used by `serve --in-memory` and by tests.
pub struct MemoryTributeStore {
    state: Mutex<MemoryState>,
    read_only: AtomicBool,
    changes_tx: broadcast::Sender<ChangeNotice>,
}

impl Default for MemoryTributeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTributeStore {
    pub fn new() -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(MemoryState::default()),
            read_only: AtomicBool::new(false),
            changes_tx,
        }
    }

    /// Rejects every write with a backend error while set.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(TributeError::backend("store is read-only"));
        }
        Ok(())
    }

    fn notify(&self, notice: ChangeNotice) {
        // No receivers is fine: nobody is watching the feed yet.
        let _ = self.changes_tx.send(notice);
    }
}

// Strictly increasing so insertion order and date order never disagree.
fn next_date(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(last) if now <= last => last + Duration::microseconds(1),
        _ => now,
    }
}

#[async_trait]
impl TributeStore for MemoryTributeStore {
    async fn insert(&self, tribute: NewTribute) -> Result<Tribute> {
        self.ensure_writable()?;
        let stored = {
            let mut state = self.lock();
            let date = next_date(state.last_date);
            state.last_date = Some(date);
            let stored = Tribute {
                id: Uuid::new_v4().simple().to_string(),
                name: tribute.name,
                message: tribute.message,
                photo_url: normalize_photo_url(tribute.photo_url),
                date,
            };
            state.docs.push(stored.clone());
            stored
        };
        self.notify(ChangeNotice::Added(stored.id.clone()));
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<Tribute>> {
        Ok(self.lock().docs.iter().find(|doc| doc.id == id).cloned())
    }

    async fn list_by_date_desc(&self) -> Result<Vec<Tribute>> {
        let mut docs = self.lock().docs.clone();
        docs.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(docs)
    }

    async fn update_message(&self, id: &str, message: &str) -> Result<bool> {
        self.ensure_writable()?;
        let updated = {
            let mut state = self.lock();
            match state.docs.iter_mut().find(|doc| doc.id == id) {
                Some(doc) => {
                    doc.message = message.to_string();
                    true
                }
                None => false,
            }
        };
        if updated {
            self.notify(ChangeNotice::Modified(id.to_string()));
        }
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<Option<Tribute>> {
        self.ensure_writable()?;
        let removed = {
            let mut state = self.lock();
            let position = state.docs.iter().position(|doc| doc.id == id);
            position.map(|index| state.docs.remove(index))
        };
        if removed.is_some() {
            self.notify(ChangeNotice::Removed(id.to_string()));
        }
        Ok(removed)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
        self.changes_tx.subscribe()
    }
}
