use thiserror::Error;

/// Result type for validation of core types.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("invalid origin url: {0}")]
    InvalidOrigin(String),
}
