use thiserror::Error;

/// Errors raised while building classification tables. Lookups never fail;
/// a miss is `None`.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("failed to read partition data: {0}")]
    Io(String),

    #[error("bad partition file name: {0}")]
    BadPartitionName(String),

    #[error("bad range bounds: {0}")]
    BadRange(String),

    #[error("bad CIDR prefix: {0}")]
    BadCidr(String),
}
