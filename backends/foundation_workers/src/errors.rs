use foundation_sync::SyncError;
use thiserror::Error;

pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("synchronization failed: {0}")]
    Sync(#[from] SyncError),

    #[error("worker {0} panicked")]
    WorkerPanicked(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("invalid scenario configuration: {0}")]
    InvalidConfig(&'static str),
}

impl CoordinatorError {
    #[must_use]
    pub fn is_worker_panic(&self) -> bool {
        matches!(self, Self::WorkerPanicked(_))
    }
}
