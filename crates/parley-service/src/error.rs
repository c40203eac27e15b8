use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] parley_db::Error),

    /// The blocking task running the store call panicked or was cancelled
    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
