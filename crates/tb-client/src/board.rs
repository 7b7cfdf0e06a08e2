use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tb_core::tribute::{validate_message, validate_submission};
use tb_core::{PhotoUpload, Snapshot, Subscription, Tribute, TributeError};

use crate::backend::{BoardBackend, SnapshotCallback};
use crate::ActionOutcome;

const FILL_ALL_FIELDS: &str = "Please fill in all fields.";
const LOAD_FAILED: &str = "Failed to load tributes.";
const SUBMIT_FAILED: &str = "Failed to submit tribute.";
const UPDATE_FAILED: &str = "Failed to update tribute.";
const DELETE_FAILED: &str = "Failed to delete tribute.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardMode {
    Detached,
    Viewing,
    Editing(String),
}

/// The submission form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone)]
struct EditBuffer {
    id: String,
    message: String,
}

#[derive(Default)]
struct BoardState {
    tributes: Snapshot,
    editing: Option<EditBuffer>,
    draft: Draft,
    photo: Option<PhotoUpload>,
    loading: bool,
    notice: Option<String>,
}

/// Headless model of the public tributes page.
///
/// All methods take `&self` so one view can be driven from several tasks,
/// the way overlapping clicks would drive the page. The list only changes
/// when the backend delivers a snapshot.
pub struct BoardView<B> {
    backend: B,
    state: Arc<Mutex<BoardState>>,
    subscription: Mutex<Option<Subscription>>,
}

impl<B: BoardBackend> BoardView<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(BoardState::default())),
            subscription: Mutex::new(None),
        }
    }

    pub async fn mount(&self) -> ActionOutcome {
        if self.is_mounted() {
            return ActionOutcome::Ignored;
        }
        let state = Arc::clone(&self.state);
        let on_change: SnapshotCallback = Box::new(move |snapshot| apply_snapshot(&state, snapshot));
        match self.backend.subscribe(on_change).await {
            Ok(subscription) => {
                *lock(&self.subscription) = Some(subscription);
                ActionOutcome::Completed
            }
            Err(err) => self.fail(LOAD_FAILED, err),
        }
    }

    /// Stops listening and discards the list, the edit buffer and the photo
    /// preview.
    pub fn unmount(&self) {
        if let Some(subscription) = lock(&self.subscription).take() {
            subscription.unsubscribe();
        }
        let mut state = self.lock_state();
        state.tributes = Snapshot::default();
        state.editing = None;
        state.photo = None;
    }

    pub fn is_mounted(&self) -> bool {
        lock(&self.subscription).is_some()
    }

    pub fn mode(&self) -> BoardMode {
        if !self.is_mounted() {
            return BoardMode::Detached;
        }
        match &self.lock_state().editing {
            Some(edit) => BoardMode::Editing(edit.id.clone()),
            None => BoardMode::Viewing,
        }
    }

    pub fn tributes(&self) -> Snapshot {
        Arc::clone(&self.lock_state().tributes)
    }

    pub fn draft(&self) -> Draft {
        self.lock_state().draft.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.lock_state().draft.name = name.into();
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.lock_state().draft.message = message.into();
    }

    /// Replaces any earlier selection.
    pub fn select_photo(&self, photo: PhotoUpload) {
        self.lock_state().photo = Some(photo);
    }

    pub fn clear_photo(&self) {
        self.lock_state().photo = None;
    }

    pub fn photo_preview(&self) -> Option<PhotoUpload> {
        self.lock_state().photo.clone()
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

    pub async fn submit(&self) -> ActionOutcome {
        let (draft, photo) = {
            let mut state = self.lock_state();
            if state.loading {
                return ActionOutcome::Ignored;
            }
            if let Err(err) = validate_submission(&state.draft.name, &state.draft.message) {
                state.notice = Some(FILL_ALL_FIELDS.to_string());
                return ActionOutcome::Failed(err);
            }
            state.loading = true;
            (state.draft.clone(), state.photo.clone())
        };

        let result = self
            .backend
            .create(&draft.name, &draft.message, photo)
            .await;

        let mut state = self.lock_state();
        state.loading = false;
        match result {
            Ok(id) => {
                tracing::debug!(id = %id, "tribute submitted");
                state.draft = Draft::default();
                state.photo = None;
                ActionOutcome::Completed
            }
            Err(err) => {
                drop(state);
                self.fail(SUBMIT_FAILED, err)
            }
        }
    }

    /// Opens the edit buffer for `id`, abandoning any other open edit.
    pub fn start_edit(&self, id: &str) -> ActionOutcome {
        let mut state = self.lock_state();
        let Some(tribute) = state.tributes.iter().find(|tribute| tribute.id == id) else {
            return ActionOutcome::Ignored;
        };
        let message = tribute.message.clone();
        state.editing = Some(EditBuffer {
            id: id.to_string(),
            message,
        });
        ActionOutcome::Completed
    }

    pub fn set_edit_message(&self, message: impl Into<String>) {
        if let Some(edit) = self.lock_state().editing.as_mut() {
            edit.message = message.into();
        }
    }

    pub fn edit_message(&self) -> Option<String> {
        self.lock_state()
            .editing
            .as_ref()
            .map(|edit| edit.message.clone())
    }

    pub fn cancel_edit(&self) {
        self.lock_state().editing = None;
    }

    pub async fn save_edit(&self) -> ActionOutcome {
        let edit = {
            let mut state = self.lock_state();
            if state.loading {
                return ActionOutcome::Ignored;
            }
            let Some(edit) = state.editing.clone() else {
                return ActionOutcome::Ignored;
            };
            if let Err(err) = validate_message(&edit.message) {
                state.notice = Some(FILL_ALL_FIELDS.to_string());
                return ActionOutcome::Failed(err);
            }
            state.loading = true;
            edit
        };

        let result = self.backend.update_message(&edit.id, &edit.message).await;

        let mut state = self.lock_state();
        state.loading = false;
        match result {
            Ok(()) => {
                if state
                    .editing
                    .as_ref()
                    .is_some_and(|current| current.id == edit.id)
                {
                    state.editing = None;
                }
                ActionOutcome::Completed
            }
            Err(err) => {
                drop(state);
                self.fail(UPDATE_FAILED, err)
            }
        }
    }

    /// Deletes regardless of the loading flag; the photo URL comes from the
    /// last snapshot.
    pub async fn delete(&self, id: &str) -> ActionOutcome {
        let photo_url = {
            let mut state = self.lock_state();
            state.loading = true;
            state
                .tributes
                .iter()
                .find(|tribute| tribute.id == id)
                .and_then(|tribute: &Tribute| tribute.photo_url.clone())
        };

        let result = self.backend.delete(id, photo_url.as_deref()).await;

        self.lock_state().loading = false;
        match result {
            Ok(()) => ActionOutcome::Completed,
            Err(err) => self.fail(DELETE_FAILED, err),
        }
    }

    fn fail(&self, notice: &str, err: TributeError) -> ActionOutcome {
        tracing::error!(error = %err, "{notice}");
        self.lock_state().notice = Some(notice.to_string());
        ActionOutcome::Failed(err)
    }

    fn lock_state(&self) -> MutexGuard<'_, BoardState> {
        lock(&self.state)
    }
}

fn apply_snapshot(state: &Mutex<BoardState>, snapshot: Snapshot) {
    let mut state = lock(state);
    let edit_gone = state
        .editing
        .as_ref()
        .is_some_and(|edit| !snapshot.iter().any(|tribute| tribute.id == edit.id));
    if edit_gone {
        tracing::debug!("edited tribute disappeared; dropping edit buffer");
        state.editing = None;
    }
    state.tributes = snapshot;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
