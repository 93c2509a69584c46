use linkvault_cache::FilterError;
use linkvault_core::CoreError;
use linkvault_storage::StorageError;
use thiserror::Error;

/// Type alias for resolver results.
pub type Result<T> = std::result::Result<T, LookupError>;

/// Errors returned by [`crate::LinkService`].
///
/// `Clone` so one coalesced lookup can hand the same error to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("short code not found")]
    NotFound,
    #[error("invalid input: {0}")]
    InvalidInput(#[from] CoreError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("task failed: {0}")]
    Task(String),
}

impl LookupError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LookupError::NotFound)
    }
}
