use tally_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no vote data found for poll: {0}")]
    NoData(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}
