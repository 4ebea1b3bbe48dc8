//! Vote delegation — entrust voting weight to another identity.
//!
//! A periodically aggregated snapshot records who delegates to whom (per
//! category) and which phone number each identity registered. At read time
//! the resolver turns that snapshot into additional weighted votes for every
//! identity that cast a direct ballot, without double counting and without
//! looping on cyclic graphs.
//!
//! This is read-side weighting only: delegations are mutated elsewhere, the
//! resolver sees an immutable snapshot per aggregation run.

pub mod resolver;
pub mod snapshot;

pub use resolver::{DelegationResolver, DelegationWeight};
pub use snapshot::{GraphSnapshot, UserEntry, SNAPSHOT_KEY};
