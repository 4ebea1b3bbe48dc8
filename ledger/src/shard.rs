//! Shard-level helpers: cooldown scanning and the append protocol.

use tally_store::{ObjectStore, StoreError};
use tally_types::record::empty_shard;
use tally_types::{TimestampMs, VoterIdentity};

/// Minimum time an identity must wait before voting again on one poll.
pub const COOLDOWN_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Result of the append-and-verify write protocol.
///
/// The store has no compare-and-swap, so two writers to the same shard can
/// race; the re-read after writing can only detect a lost update, not
/// prevent one. Whether to surface a suspected loss is the caller's call —
/// the ledger never retries, since a blind retry could double-insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendResult {
    /// The re-read observed the new record.
    Confirmed,
    /// The re-read did not contain the new record; it may have been
    /// overwritten by a concurrent writer, or may simply not be visible yet.
    LostUpdateSuspected,
}

/// Read a shard's current body, treating an absent object as a fresh shard
/// holding only the current header.
pub fn read_or_init(store: &dyn ObjectStore, key: &str) -> Result<String, StoreError> {
    match store.get_text(key) {
        Ok(body) => Ok(body),
        Err(e) if e.is_not_found() => Ok(empty_shard()),
        Err(e) => Err(e),
    }
}

/// Append one record line to a shard body, normalizing the trailing newline.
pub fn append_line(body: &str, line: &str) -> String {
    if body.ends_with('\n') {
        format!("{body}{line}\n")
    } else {
        format!("{body}\n{line}\n")
    }
}

/// Write the shard back and re-read to confirm the new line is present.
pub fn write_and_verify(
    store: &dyn ObjectStore,
    key: &str,
    body: &str,
    line: &str,
) -> Result<AppendResult, StoreError> {
    store.put(key, body.as_bytes())?;
    let observed = store.get_text(key)?;
    if observed.contains(line) {
        Ok(AppendResult::Confirmed)
    } else {
        Ok(AppendResult::LostUpdateSuspected)
    }
}

/// Scan a shard body for a vote by the same identity within the cooldown
/// window. Returns the next-eligible timestamp of the first conflicting
/// vote found. Malformed lines (including the header) are skipped.
pub fn find_cooldown_conflict(
    body: &str,
    identity: &VoterIdentity,
    now: TimestampMs,
) -> Option<TimestampMs> {
    for line in body.lines() {
        let mut cols = line.splitn(3, ',');
        let (Some(time_col), Some(ip_col)) = (cols.next(), cols.next()) else {
            continue;
        };
        let Ok(millis) = time_col.parse::<u64>() else {
            continue;
        };
        if ip_col.is_empty() {
            continue;
        }
        let previous = VoterIdentity::new(ip_col);
        if !identity.same_identity(&previous) {
            continue;
        }
        let voted_at = TimestampMs::new(millis);
        if !voted_at.has_expired(COOLDOWN_WINDOW_MS, now) {
            return Some(voted_at.plus(COOLDOWN_WINDOW_MS));
        }
    }
    None
}
