//! Abstract object storage for the tally poll ledger.
//!
//! Every storage backend (filesystem, S3-compatible blob stores, in-memory
//! for testing) implements [`ObjectStore`]. The rest of the workspace
//! depends only on the trait.
//!
//! The contract is deliberately thin — `get`/`put`/`list` and nothing else.
//! There are no transactions, no compare-and-swap, and reads are not
//! guaranteed to observe the most recent write. Callers that need stronger
//! guarantees must detect violations themselves (see the ledger's
//! append-and-verify protocol).

pub mod error;
pub mod object;

pub use error::StoreError;
pub use object::ObjectStore;
