use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::{AbortHandle, JoinHandle};

use crate::error::Result;
use crate::metrics;
use crate::store::{ChangeNotice, TributeStore};
use crate::tribute::Tribute;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;
const REFRESH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// The whole collection ordered by date, newest first.
pub type Snapshot = Arc<Vec<Tribute>>;

struct FeedShared {
    current: RwLock<Snapshot>,
    snapshots_tx: Mutex<Option<broadcast::Sender<Snapshot>>>,
}

impl FeedShared {
    fn current(&self) -> Snapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, snapshot: Snapshot) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        if let Some(tx) = self
            .snapshots_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(snapshot);
        }
    }

    fn receiver(&self) -> Option<broadcast::Receiver<Snapshot>> {
        self.snapshots_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(broadcast::Sender::subscribe)
    }
}

/// Live view of the tribute collection.
///
/// One background task turns store change notices into full snapshots.
/// Notices that pile up while a query runs are folded into the next one.
pub struct TributeFeed {
    shared: Arc<FeedShared>,
    pump: JoinHandle<()>,
}

impl TributeFeed {
    pub async fn start(store: Arc<dyn TributeStore>) -> Result<Self> {
        // Subscribe before the first read so no change falls in between.
        let changes = store.changes();
        let initial = Arc::new(store.list_by_date_desc().await?);
        metrics::inc_feed_snapshot("initial");

        let (snapshots_tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let shared = Arc::new(FeedShared {
            current: RwLock::new(initial),
            snapshots_tx: Mutex::new(Some(snapshots_tx)),
        });
        let pump = tokio::spawn(pump(store, changes, Arc::clone(&shared)));
        Ok(Self { shared, pump })
    }

    pub fn current(&self) -> Snapshot {
        self.shared.current()
    }

    /// Yields the current snapshot first, then one per change.
    pub fn listen(&self) -> FeedReceiver {
        FeedReceiver::new(Arc::clone(&self.shared), "stream")
    }

    /// Calls `on_change` with the current snapshot before returning, then
    /// from a background task after every change.
    pub fn subscribe<F>(&self, mut on_change: F) -> Subscription
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        let mut receiver = FeedReceiver::new(Arc::clone(&self.shared), "callback");
        if let Some(initial) = receiver.pending.take() {
            receiver.last = Some(Arc::clone(&initial));
            on_change(initial);
        }
        let task = tokio::spawn(async move {
            while let Some(snapshot) = receiver.next().await {
                on_change(snapshot);
            }
        });
        Subscription::from_task(&task)
    }

    /// Stops the pump and ends every open receiver.
    pub fn shutdown(&self) {
        self.pump.abort();
        self.shared
            .snapshots_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl Drop for TributeFeed {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump(
    store: Arc<dyn TributeStore>,
    mut changes: broadcast::Receiver<ChangeNotice>,
    shared: Arc<FeedShared>,
) {
    // Set while a refresh is owed, including after a failed read.
    let mut pending: Option<&'static str> = None;
    let mut closed = false;
    loop {
        let mut source = match pending.take() {
            Some(source) => source,
            None if closed => break,
            None => match changes.recv().await {
                Ok(ChangeNotice::Resync) | Err(RecvError::Lagged(_)) => "resync",
                Ok(_) => "change",
                Err(RecvError::Closed) => break,
            },
        };
        while !closed {
            match changes.try_recv() {
                Ok(ChangeNotice::Resync) | Err(TryRecvError::Lagged(_)) => source = "resync",
                Ok(_) => {}
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => closed = true,
            }
        }

        match store.list_by_date_desc().await {
            Ok(tributes) => {
                tracing::debug!(count = tributes.len(), source, "tribute snapshot published");
                metrics::inc_feed_snapshot(source);
                shared.publish(Arc::new(tributes));
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    retry_in_ms = REFRESH_RETRY_DELAY.as_millis() as u64,
                    "failed to refresh tribute snapshot"
                );
                pending = Some(source);
                tokio::time::sleep(REFRESH_RETRY_DELAY).await;
            }
        }
    }
    tracing::debug!("tribute feed stopped");
}

struct SubscriberGauge {
    kind: &'static str,
}

impl SubscriberGauge {
    fn new(kind: &'static str) -> Self {
        metrics::inc_live_subscribers(kind);
        Self { kind }
    }
}

impl Drop for SubscriberGauge {
    fn drop(&mut self) {
        metrics::dec_live_subscribers(self.kind);
    }
}

/// Async stream of snapshots. Falling behind skips straight to the newest
/// snapshot, which is safe because every snapshot is complete.
pub struct FeedReceiver {
    shared: Arc<FeedShared>,
    rx: Option<broadcast::Receiver<Snapshot>>,
    pending: Option<Snapshot>,
    last: Option<Snapshot>,
    _gauge: SubscriberGauge,
}

impl FeedReceiver {
    fn new(shared: Arc<FeedShared>, kind: &'static str) -> Self {
        let rx = shared.receiver();
        let pending = Some(shared.current());
        Self {
            shared,
            rx,
            pending,
            last: None,
            _gauge: SubscriberGauge::new(kind),
        }
    }

    /// `None` once the feed has shut down.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if let Some(initial) = self.pending.take() {
            self.last = Some(Arc::clone(&initial));
            return Some(initial);
        }
        loop {
            let rx = self.rx.as_mut()?;
            let snapshot = match rx.recv().await {
                Ok(snapshot) => snapshot,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "feed receiver lagged");
                    self.shared.current()
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            };
            // The snapshot read at subscribe time may also arrive on the channel.
            if self
                .last
                .as_ref()
                .is_some_and(|last| Arc::ptr_eq(last, &snapshot))
            {
                continue;
            }
            self.last = Some(Arc::clone(&snapshot));
            return Some(snapshot);
        }
    }
}

/// Handle for a callback subscription. Dropping it unsubscribes.
pub struct Subscription {
    task: AbortHandle,
    active: AtomicBool,
}

impl Subscription {
    pub fn from_task(task: &JoinHandle<()>) -> Self {
        Self {
            task: task.abort_handle(),
            active: AtomicBool::new(true),
        }
    }

    /// Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.task.abort();
            tracing::debug!("tribute subscription closed");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTributeStore;
    use crate::tribute::NewTribute;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn draft(name: &str) -> NewTribute {
        NewTribute {
            name: name.to_string(),
            message: "remembered".to_string(),
            photo_url: None,
        }
    }

    async fn next_snapshot(receiver: &mut FeedReceiver) -> Snapshot {
        timeout(Duration::from_secs(2), receiver.next())
            .await
            .expect("snapshot in time")
            .expect("feed open")
    }

    #[tokio::test]
    async fn listen_yields_current_state_then_changes() {
        let store = Arc::new(MemoryTributeStore::new());
        store.insert(draft("first")).await.unwrap();
        let feed = TributeFeed::start(store.clone()).await.unwrap();

        let mut receiver = feed.listen();
        assert_eq!(next_snapshot(&mut receiver).await.len(), 1);

        store.insert(draft("second")).await.unwrap();
        let snapshot = next_snapshot(&mut receiver).await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "second");
    }

    #[tokio::test]
    async fn subscribe_delivers_the_initial_snapshot_synchronously() {
        let store = Arc::new(MemoryTributeStore::new());
        let feed = TributeFeed::start(store.clone()).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = feed.subscribe(move |snapshot| {
            let _ = tx.send(snapshot.len());
        });
        assert_eq!(rx.try_recv().unwrap(), 0);

        store.insert(draft("one")).await.unwrap();
        let len = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(len, 1);
        assert!(subscription.is_active());
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_stops_callbacks() {
        let store = Arc::new(MemoryTributeStore::new());
        let feed = TributeFeed::start(store.clone()).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = feed.subscribe(move |snapshot| {
            let _ = tx.send(snapshot.len());
        });
        assert_eq!(rx.try_recv().unwrap(), 0);

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert!(!subscription.is_active());

        store.insert(draft("late")).await.unwrap();
        // The sender lives in the aborted task, so the channel closes.
        let next = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn shutdown_ends_open_receivers() {
        let store = Arc::new(MemoryTributeStore::new());
        let feed = TributeFeed::start(store).await.unwrap();
        let mut receiver = feed.listen();
        next_snapshot(&mut receiver).await;

        feed.shutdown();
        let ended = timeout(Duration::from_secs(2), receiver.next()).await.unwrap();
        assert!(ended.is_none());
    }

    /// Fails the listed `list_by_date_desc` calls, counted from one.
    struct FlakyStore {
        inner: MemoryTributeStore,
        reads: std::sync::atomic::AtomicUsize,
        failing_reads: Vec<usize>,
    }

    #[async_trait::async_trait]
    impl TributeStore for FlakyStore {
        async fn insert(&self, tribute: NewTribute) -> Result<Tribute> {
            self.inner.insert(tribute).await
        }

        async fn get(&self, id: &str) -> Result<Option<Tribute>> {
            self.inner.get(id).await
        }

        async fn list_by_date_desc(&self) -> Result<Vec<Tribute>> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing_reads.contains(&read) {
                return Err(crate::TributeError::backend("store unavailable"));
            }
            self.inner.list_by_date_desc().await
        }

        async fn update_message(&self, id: &str, message: &str) -> Result<bool> {
            self.inner.update_message(id, message).await
        }

        async fn delete(&self, id: &str) -> Result<Option<Tribute>> {
            self.inner.delete(id).await
        }

        fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
            self.inner.changes()
        }
    }

    #[tokio::test]
    async fn failed_refresh_is_retried_without_another_change() {
        let store = Arc::new(FlakyStore {
            inner: MemoryTributeStore::new(),
            reads: std::sync::atomic::AtomicUsize::new(0),
            failing_reads: vec![2, 3],
        });
        let feed = TributeFeed::start(store.clone()).await.unwrap();
        let mut receiver = feed.listen();
        assert!(next_snapshot(&mut receiver).await.is_empty());

        store.insert(draft("only")).await.unwrap();

        let snapshot = timeout(Duration::from_secs(5), receiver.next())
            .await
            .expect("refresh retried")
            .expect("feed open");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(feed.current().len(), 1);
        assert!(store.reads.load(Ordering::SeqCst) >= 4);
    }
}
