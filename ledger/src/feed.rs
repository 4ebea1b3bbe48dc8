//! The "recent activity" feed — a best-effort side effect of accepted votes.
//!
//! Failure to update the feed must never fail the vote itself; the ledger
//! logs and moves on.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tally_store::{ObjectStore, StoreError};
use tally_types::TimestampMs;

/// Object-store key of the feed.
pub const RECENT_VOTES_KEY: &str = "recent_votes/all_polls.json";

/// Feed length bound; older entries fall off.
pub const MAX_FEED_ENTRIES: usize = 100;

/// One feed entry. The identity is already masked (coarse feed mask) by the
/// time it reaches the sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedEntry {
    pub poll: String,
    pub vote: String,
    pub timestamp: TimestampMs,
    pub ip: String,
    pub country: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FeedBody {
    votes: Vec<FeedEntry>,
}

/// Sink notified of every accepted vote.
pub trait RecentActivitySink: Send + Sync {
    fn record_vote(&self, entry: FeedEntry) -> Result<(), StoreError>;
}

/// The store-backed feed: newest first, bounded length.
pub struct RecentVotesFeed {
    store: Arc<dyn ObjectStore>,
}

impl RecentVotesFeed {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn load(&self) -> Result<FeedBody, StoreError> {
        match self.store.get_text(RECENT_VOTES_KEY) {
            Ok(data) => Ok(serde_json::from_str(&data).unwrap_or_default()),
            Err(e) if e.is_not_found() => Ok(FeedBody::default()),
            Err(e) => Err(e),
        }
    }
}

impl RecentActivitySink for RecentVotesFeed {
    fn record_vote(&self, entry: FeedEntry) -> Result<(), StoreError> {
        let mut body = self.load()?;
        body.votes.insert(0, entry);
        body.votes.truncate(MAX_FEED_ENTRIES);
        let data = serde_json::to_vec(&body).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.store.put(RECENT_VOTES_KEY, &data)
    }
}
