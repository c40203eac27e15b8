use thiserror::Error;
use uuid::Uuid;

/// Errors returned by every store operation. Nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// Referenced message, user or notification does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// A new message points at a sender, receiver or parent that does not exist
    #[error("{entity} {id} is referenced but does not exist")]
    Reference { entity: &'static str, id: Uuid },

    /// Acting identity is not allowed to perform the operation
    #[error("permission denied: {0}")]
    Permission(String),

    /// An atomic unit failed partway and was rolled back
    #[error("integrity violation during {operation}: {source}")]
    Integrity {
        operation: &'static str,
        source: rusqlite::Error,
    },

    /// Unique username or email already taken
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("thread rooted at {root} exceeds maximum depth {limit}")]
    ThreadTooDeep { root: Uuid, limit: usize },

    #[error("storage error: {0}")]
    Storage(#[source] rusqlite::Error),

    #[error("database lock poisoned: {0}")]
    LockPoisoned(String),

    /// A stored id or timestamp could not be decoded
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

impl Error {
    pub(crate) fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub(crate) fn reference(entity: &'static str, id: Uuid) -> Self {
        Self::Reference { entity, id }
    }

    /// Wraps a storage failure that happened inside an atomic unit after it
    /// started writing.
    pub(crate) fn integrity(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Integrity { operation, source }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::FromSqlConversionFailure(idx, _, inner) => {
                Self::Corrupt(format!("column {}: {}", idx, inner))
            }
            other => Self::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
