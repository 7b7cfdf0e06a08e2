use std::sync::{Mutex, MutexGuard, PoisonError};
use tb_core::admin::AdminSession;
use tb_core::{Tribute, TributeError};

use crate::backend::AdminBackend;
use crate::ActionOutcome;

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const DELETED: &str = "Tribute deleted successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminMode {
    Login,
    Authenticated,
}

#[derive(Default)]
struct AdminState {
    session: Option<AdminSession>,
    tributes: Vec<Tribute>,
    loading: bool,
    notice: Option<String>,
}

/// Headless model of the admin dashboard. Nothing is persisted, so a new
/// view always starts at the login form.
pub struct AdminView<B> {
    backend: B,
    state: Mutex<AdminState>,
}

impl<B: AdminBackend> AdminView<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: Mutex::new(AdminState::default()),
        }
    }

    pub fn mode(&self) -> AdminMode {
        if self.lock_state().session.is_some() {
            AdminMode::Authenticated
        } else {
            AdminMode::Login
        }
    }

    pub fn username(&self) -> Option<String> {
        self.lock_state()
            .session
            .as_ref()
            .map(|session| session.username.clone())
    }

    pub fn tributes(&self) -> Vec<Tribute> {
        self.lock_state().tributes.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock_state().loading
    }

    pub fn notice(&self) -> Option<String> {
        self.lock_state().notice.clone()
    }

    pub fn dismiss_notice(&self) {
        self.lock_state().notice = None;
    }

    /// On success the view switches to the dashboard and loads the list once.
    pub async fn login(&self, username: &str, password: &str) -> ActionOutcome {
        match self.backend.login(username, password).await {
            Ok(session) => {
                tracing::info!(username = %session.username, "admin signed in");
                {
                    let mut state = self.lock_state();
                    state.session = Some(session);
                    state.notice = None;
                }
                self.refresh().await
            }
            Err(err) => {
                let notice = match &err {
                    TributeError::Unauthorized(_) => INVALID_CREDENTIALS.to_string(),
                    other => other.to_string(),
                };
                tracing::warn!(error = %err, "admin sign-in failed");
                self.lock_state().notice = Some(notice);
                ActionOutcome::Failed(err)
            }
        }
    }

    pub fn logout(&self) {
        let mut state = self.lock_state();
        state.session = None;
        state.tributes.clear();
        state.notice = None;
    }

    /// One non-live fetch. A failure keeps the previous list.
    pub async fn refresh(&self) -> ActionOutcome {
        let Some(token) = self.token() else {
            return ActionOutcome::Ignored;
        };
        self.lock_state().loading = true;
        let result = self.backend.list(&token).await;
        let mut state = self.lock_state();
        state.loading = false;
        match result {
            Ok(tributes) => {
                state.tributes = tributes;
                ActionOutcome::Completed
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to fetch tributes");
                ActionOutcome::Failed(err)
            }
        }
    }

    /// Deletes `id` and, only if that succeeded, fetches the list again.
    pub async fn delete(&self, id: &str) -> ActionOutcome {
        let Some(token) = self.token() else {
            return ActionOutcome::Ignored;
        };
        match self.backend.delete(&token, id).await {
            Ok(()) => {
                self.lock_state().notice = Some(DELETED.to_string());
                match self.refresh().await {
                    ActionOutcome::Failed(err) => ActionOutcome::Failed(err),
                    _ => ActionOutcome::Completed,
                }
            }
            Err(err) => {
                tracing::error!(error = %err, id = %id, "failed to delete tribute");
                self.lock_state().notice = Some(format!("Error deleting tribute: {err}"));
                ActionOutcome::Failed(err)
            }
        }
    }

    fn token(&self) -> Option<String> {
        self.lock_state()
            .session
            .as_ref()
            .map(|session| session.token.clone())
    }

    fn lock_state(&self) -> MutexGuard<'_, AdminState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalAdmin;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, OnceLock};
    use tb_core::admin::{hash_password, AdminGate};
    use tb_core::auth::JwtConfig;
    use tb_core::blob::MemoryBlobStore;
    use tb_core::store::MemoryTributeStore;
    use tb_core::TributeRepository;

    const PASSWORD: &str = "munde@006";

    fn password_hash() -> &'static str {
        static HASH: OnceLock<String> = OnceLock::new();
        HASH.get_or_init(|| hash_password(PASSWORD).expect("hash password"))
    }

    /// Counts list calls and can be told to fail them.
    struct Counting {
        inner: LocalAdmin,
        fetches: AtomicUsize,
        fail_fetch: AtomicBool,
        fail_delete: AtomicBool,
    }

    #[async_trait]
    impl AdminBackend for Counting {
        async fn login(&self, username: &str, password: &str) -> tb_core::Result<AdminSession> {
            self.inner.login(username, password).await
        }

        async fn list(&self, token: &str) -> tb_core::Result<Vec<Tribute>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(TributeError::backend("list unavailable"));
            }
            self.inner.list(token).await
        }

        async fn delete(&self, token: &str, id: &str) -> tb_core::Result<()> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(TributeError::backend("delete unavailable"));
            }
            self.inner.delete(token, id).await
        }
    }

    struct Fixture {
        repository: Arc<TributeRepository>,
        view: AdminView<Counting>,
    }

    impl Fixture {
        fn fetches(&self) -> usize {
            self.view.backend.fetches.load(Ordering::SeqCst)
        }
    }

    async fn fixture() -> Fixture {
        let repository = Arc::new(
            TributeRepository::new(
                Arc::new(MemoryTributeStore::new()),
                Arc::new(MemoryBlobStore::default()),
            )
            .await
            .expect("repository"),
        );
        for (name, message) in [("Asha", "Rest well"), ("Baraka", "Go well")] {
            TributeRepository::create(&repository, name, message, None)
                .await
                .expect("create");
        }
        let gate = AdminGate::new(
            "admin",
            password_hash(),
            "shared-secret",
            JwtConfig::admin_sessions("session-secret", 3600),
        )
        .expect("gate");
        let backend = Counting {
            inner: LocalAdmin::new(Arc::new(gate), Arc::clone(&repository)),
            fetches: AtomicUsize::new(0),
            fail_fetch: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        };
        Fixture {
            repository,
            view: AdminView::new(backend),
        }
    }

    #[tokio::test]
    async fn wrong_password_stays_on_login_without_fetching() {
        let fixture = fixture().await;
        let outcome = fixture.view.login("admin", "guess").await;

        assert!(matches!(
            outcome,
            ActionOutcome::Failed(TributeError::Unauthorized(_))
        ));
        assert_eq!(fixture.view.mode(), AdminMode::Login);
        assert_eq!(fixture.view.notice().as_deref(), Some(INVALID_CREDENTIALS));
        assert_eq!(fixture.fetches(), 0);
        assert!(fixture.view.tributes().is_empty());
    }

    #[tokio::test]
    async fn correct_credentials_fetch_once() {
        let fixture = fixture().await;
        assert_eq!(
            fixture.view.login("admin", PASSWORD).await,
            ActionOutcome::Completed
        );

        assert_eq!(fixture.view.mode(), AdminMode::Authenticated);
        assert_eq!(fixture.view.username().as_deref(), Some("admin"));
        assert_eq!(fixture.fetches(), 1);
        assert_eq!(fixture.view.tributes().len(), 2);
        assert!(!fixture.view.is_loading());
    }

    #[tokio::test]
    async fn delete_refetches_exactly_once() {
        let fixture = fixture().await;
        fixture.view.login("admin", PASSWORD).await;
        let id = fixture.view.tributes()[0].id.clone();

        assert_eq!(fixture.view.delete(&id).await, ActionOutcome::Completed);

        assert_eq!(fixture.fetches(), 2);
        assert_eq!(fixture.view.tributes().len(), 1);
        assert!(fixture.view.tributes().iter().all(|t| t.id != id));
        assert_eq!(fixture.view.notice().as_deref(), Some(DELETED));
        assert!(fixture.repository.get(&id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn failed_delete_keeps_list_and_skips_refetch() {
        let fixture = fixture().await;
        fixture.view.login("admin", PASSWORD).await;
        let before = fixture.view.tributes();
        fixture.view.backend.fail_delete.store(true, Ordering::SeqCst);

        let outcome = fixture.view.delete(&before[0].id).await;

        assert!(matches!(outcome, ActionOutcome::Failed(_)));
        assert_eq!(fixture.fetches(), 1);
        assert_eq!(fixture.view.tributes(), before);
        assert!(fixture
            .view
            .notice()
            .is_some_and(|notice| notice.starts_with("Error deleting tribute: ")));
    }

    #[tokio::test]
    async fn failed_fetch_keeps_stale_list() {
        let fixture = fixture().await;
        fixture.view.login("admin", PASSWORD).await;
        let before = fixture.view.tributes();
        fixture.view.backend.fail_fetch.store(true, Ordering::SeqCst);

        let outcome = fixture.view.refresh().await;

        assert!(matches!(outcome, ActionOutcome::Failed(_)));
        assert_eq!(fixture.view.tributes(), before);
        assert!(!fixture.view.is_loading());
    }

    #[tokio::test]
    async fn logout_returns_to_login() {
        let fixture = fixture().await;
        fixture.view.login("admin", PASSWORD).await;
        fixture.view.logout();

        assert_eq!(fixture.view.mode(), AdminMode::Login);
        assert!(fixture.view.tributes().is_empty());
        assert_eq!(fixture.view.refresh().await, ActionOutcome::Ignored);
        assert_eq!(fixture.view.delete("any").await, ActionOutcome::Ignored);
        assert_eq!(fixture.fetches(), 1);
    }
}
