use thiserror::Error;

/// Failure taxonomy shared by the repository, the HTTP surface and the views.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TributeError {
    /// A required field is missing; raised before any network I/O.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Any other store, storage or transport failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl TributeError {
    pub fn validation(message: impl Into<String>) -> Self {
        TributeError::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        TributeError::NotFound(what.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        TributeError::Unauthorized(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        TributeError::Backend(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            TributeError::Validation(_) => "VALIDATION_ERROR",
            TributeError::NotFound(_) => "NOT_FOUND",
            TributeError::Unauthorized(_) => "UNAUTHORIZED",
            TributeError::Backend(_) => "BACKEND_ERROR",
        }
    }
}

impl From<sqlx::Error> for TributeError {
    fn from(err: sqlx::Error) -> Self {
        TributeError::Backend(err.to_string())
    }
}

impl From<reqwest::Error> for TributeError {
    fn from(err: reqwest::Error) -> Self {
        TributeError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for TributeError {
    fn from(err: serde_json::Error) -> Self {
        TributeError::Backend(err.to_string())
    }
}

impl From<anyhow::Error> for TributeError {
    fn from(err: anyhow::Error) -> Self {
        TributeError::Backend(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TributeError>;
