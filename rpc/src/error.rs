//! RPC error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("poll not found: {0}")]
    PollNotFound(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<tally_store::StoreError> for RpcError {
    fn from(e: tally_store::StoreError) -> Self {
        match e {
            tally_store::StoreError::NotFound(ref key) => {
                RpcError::Store(format!("not found: {key}"))
            }
            other => RpcError::Store(other.to_string()),
        }
    }
}
