//! Fundamental types for the tally poll ledger.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: timestamps, voter identities, poll identifiers, country codes,
//! and the versioned vote-record codec.

pub mod country;
pub mod identity;
pub mod poll;
pub mod record;
pub mod time;

pub use country::CountryCode;
pub use identity::VoterIdentity;
pub use poll::{PollId, PollShape};
pub use record::{RecordError, SchemaVersion, VoteRecord};
pub use time::TimestampMs;

/// Characters that must never appear in a poll name or an open-poll option.
///
/// Commas and line breaks would corrupt the record format; angle brackets,
/// quotes and equals signs are rejected to keep stored values inert when
/// rendered elsewhere.
pub const FORBIDDEN_CHARS: [char; 8] = [',', '\n', '\r', '\t', '>', '<', '"', '='];

/// Whether `s` contains any character from [`FORBIDDEN_CHARS`].
pub fn contains_forbidden(s: &str) -> bool {
    s.chars().any(|c| FORBIDDEN_CHARS.contains(&c))
}
