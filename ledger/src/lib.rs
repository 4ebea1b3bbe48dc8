//! The vote ledger — admitting ballots into the sharded record store.
//!
//! A poll's votes live in append-only shards, one per identity bucket, on a
//! blob store with no transactions and only eventual read-after-write
//! visibility. The ledger validates a submission, enforces the one-week
//! cooldown per identity, stamps classification data, and runs the
//! append-and-verify write protocol: write the whole shard back, re-read,
//! and confirm the new record landed. A lost race is detected — never
//! prevented, never retried — and reported to the caller.

pub mod error;
pub mod feed;
pub mod shard;
pub mod submit;
pub mod verify;

pub use error::{RejectReason, SubmitError};
pub use feed::{FeedEntry, RecentActivitySink, RecentVotesFeed, RECENT_VOTES_KEY};
pub use shard::{AppendResult, COOLDOWN_WINDOW_MS};
pub use submit::{VoteLedger, VoteReceipt, VoteRequest};
