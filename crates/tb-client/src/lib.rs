//! Client side of the tribute board: headless view models for the public
//! board and the admin dashboard, and the backends they talk to.

pub mod admin;
pub mod backend;
pub mod board;
pub mod http;

pub use admin::{AdminMode, AdminView};
pub use backend::{AdminBackend, BoardBackend, LocalAdmin, SnapshotCallback};
pub use board::{BoardMode, BoardView, Draft};
pub use http::{HttpClient, LiveStream};

/// Result of a user action on a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    /// Dropped without effect, e.g. while another action is loading.
    Ignored,
    /// The failure is also shown as the view's notice.
    Failed(tb_core::TributeError),
}

impl ActionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ActionOutcome::Completed)
    }
}
