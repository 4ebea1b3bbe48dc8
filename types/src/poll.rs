//! Poll identifiers and option validation.
//!
//! A poll name doubles as its schema: `a_or_b` encodes a two-option poll,
//! the reserved `open_` namespace admits free-text options, and everything
//! else is a yes/no question. Commas are stored escaped (`%2C`) so names
//! survive the record format.

use crate::{contains_forbidden, FORBIDDEN_CHARS};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum length of a free-text option in an open poll.
pub const MAX_OPEN_OPTION_LEN: usize = 100;

/// Namespace prefix reserved for open (free-text) polls.
pub const OPEN_PREFIX: &str = "open_";

/// Separator encoding a two-option poll in its name.
pub const OPTION_SEPARATOR: &str = "_or_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("poll name must not be empty")]
    EmptyName,

    #[error("poll name is reserved: the {OPEN_PREFIX} namespace cannot be created directly")]
    ReservedNamespace,

    #[error("poll name contains forbidden characters: {0}")]
    ForbiddenCharacters(String),

    #[error("option must match one of the poll options")]
    OptionMismatch,

    #[error("option must be either \"yes\" or \"no\"")]
    NotYesNo,

    #[error("option must be {MAX_OPEN_OPTION_LEN} characters or less and contain no special characters")]
    BadOpenOption,
}

/// The answer shape a poll admits, derived from its name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollShape {
    /// Exactly two named options, encoded in the poll name.
    TwoOption(String, String),
    /// Plain yes/no question.
    YesNo,
    /// Free-text options (the `open_` namespace).
    Open,
}

/// Canonical poll identifier: comma-escaped, `open_`-prefixed when the poll
/// lives in the open namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollId(String);

impl PollId {
    /// Build a poll id from caller input. Escapes commas, rejects direct use
    /// of the reserved `open_` namespace and forbidden characters, and
    /// applies the `open_` prefix when `open` is set.
    pub fn new(raw: &str, open: bool) -> Result<Self, PollError> {
        if raw.is_empty() {
            return Err(PollError::EmptyName);
        }
        let escaped = raw.replace(',', "%2C");
        if escaped.starts_with(OPEN_PREFIX) {
            return Err(PollError::ReservedNamespace);
        }
        if contains_forbidden(&escaped) {
            return Err(PollError::ForbiddenCharacters(escaped));
        }
        if open {
            Ok(Self(format!("{OPEN_PREFIX}{escaped}")))
        } else {
            Ok(Self(escaped))
        }
    }

    /// Wrap a name read back from storage keys (already canonical).
    pub fn from_stored(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Extract the poll id from a shard or sentinel key of the form
    /// `votes/poll=<name>/...`.
    pub fn from_object_key(key: &str) -> Option<Self> {
        let segment = key.split('/').nth(1)?;
        let name = segment.strip_prefix("poll=")?;
        if name.is_empty() {
            return None;
        }
        Some(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The poll name with `%2C` unescaped back to commas (display form).
    pub fn unescaped(&self) -> String {
        self.0.replace("%2C", ",")
    }

    /// Text used for free-text search: unescaped, underscores as spaces.
    pub fn search_text(&self) -> String {
        self.unescaped().replace('_', " ")
    }

    /// The answer shape this poll admits.
    pub fn shape(&self) -> PollShape {
        if self.0.starts_with(OPEN_PREFIX) {
            return PollShape::Open;
        }
        let mut parts = self.0.splitn(2, OPTION_SEPARATOR);
        match (parts.next(), parts.next()) {
            (Some(first), Some(rest)) => {
                // Only the first two encoded options count, mirroring how
                // the name was assembled.
                let second = rest.split(OPTION_SEPARATOR).next().unwrap_or(rest);
                PollShape::TwoOption(first.to_string(), second.to_string())
            }
            _ => PollShape::YesNo,
        }
    }

    /// Validate a submitted option against this poll's shape.
    pub fn validate_option(&self, option: &str) -> Result<(), PollError> {
        match self.shape() {
            PollShape::Open => {
                if option.is_empty()
                    || option.len() > MAX_OPEN_OPTION_LEN
                    || option.chars().any(|c| FORBIDDEN_CHARS.contains(&c))
                {
                    Err(PollError::BadOpenOption)
                } else {
                    Ok(())
                }
            }
            PollShape::TwoOption(a, b) => {
                if option == a || option == b {
                    Ok(())
                } else {
                    Err(PollError::OptionMismatch)
                }
            }
            PollShape::YesNo => {
                if option == "yes" || option == "no" {
                    Ok(())
                } else {
                    Err(PollError::NotYesNo)
                }
            }
        }
    }

    // ── Object-store keys ────────────────────────────────────────────────

    /// Key of the shard for one identity bucket.
    pub fn shard_key(&self, partition: &str) -> String {
        format!("votes/poll={}/ip_prefix={}/votes.csv", self.0, partition)
    }

    /// Prefix under which all of this poll's shards live.
    pub fn shard_prefix(&self) -> String {
        format!("votes/poll={}/ip_prefix=", self.0)
    }

    /// Key of the disable sentinel; its presence alone disables the poll.
    pub fn disabled_key(&self) -> String {
        format!("votes/poll={}/disabled", self.0)
    }

    /// Key of the poll's tag/comment metadata object.
    pub fn metadata_key(&self) -> String {
        format!("metadata/poll={}/metadata.json", self.0)
    }

    /// Key of the aggregated, masked results cache.
    pub fn results_cache_key(&self) -> String {
        format!("votes_aggregated_and_masked/poll={}/votes.csv", self.0)
    }
}

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
