//! Aggregation and ranking over the sharded vote store.
//!
//! Read paths only: merge a poll's shards into one masked, delegation-
//! weighted CSV table; rank all polls for the popular listing under a TTL
//! cache with a partial single-poll refresh; and sweep shards to refresh
//! provider classification columns in place.

pub mod error;
pub mod mask;
pub mod ranking;
pub mod reclassify;
pub mod results;

pub use error::AggregateError;
pub use ranking::{PopularPolls, PopularQuery, RankedPage};
pub use reclassify::{Reclassifier, SweepSummary};
pub use results::{CacheStatus, PollAggregator, PollResults};
