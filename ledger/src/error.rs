//! Submission rejection taxonomy.
//!
//! Every rejection carries a stable machine-checkable reason alongside the
//! human-readable message; nothing escapes as an unhandled fault.

use tally_store::StoreError;
use tally_types::poll::PollError;
use tally_types::TimestampMs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(#[from] PollError),

    #[error("invalid country code")]
    InvalidCountryHint(String),

    #[error("invalid source address: {0}")]
    InvalidIdentity(String),

    #[error("voting has been permanently disabled for this poll")]
    PollDisabled,

    #[error("cannot vote again for this poll until {}", next_eligible.to_iso8601())]
    DuplicateVote { next_eligible: TimestampMs },

    #[error("the vote may not have been recorded; please check the poll and retry if absent")]
    StorageInconsistency,

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Stable reason codes surfaced to callers alongside the message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    Validation,
    DuplicateVote,
    PollDisabled,
    StorageInconsistency,
    StorageFailure,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::DuplicateVote => "duplicate_vote",
            Self::PollDisabled => "poll_disabled",
            Self::StorageInconsistency => "storage_inconsistency",
            Self::StorageFailure => "storage_failure",
        }
    }
}

impl SubmitError {
    /// The machine-checkable reason for this rejection.
    pub fn reason(&self) -> RejectReason {
        match self {
            Self::Validation(_) | Self::InvalidCountryHint(_) | Self::InvalidIdentity(_) => {
                RejectReason::Validation
            }
            Self::PollDisabled => RejectReason::PollDisabled,
            Self::DuplicateVote { .. } => RejectReason::DuplicateVote,
            Self::StorageInconsistency => RejectReason::StorageInconsistency,
            Self::Store(_) => RejectReason::StorageFailure,
        }
    }

    /// The next time this identity may vote again, when the rejection is a
    /// cooldown violation.
    pub fn next_eligible(&self) -> Option<TimestampMs> {
        match self {
            Self::DuplicateVote { next_eligible } => Some(*next_eligible),
            _ => None,
        }
    }
}
