use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error means "the object does not exist" rather than a
    /// backend fault. Several callers treat absence as a normal state.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
