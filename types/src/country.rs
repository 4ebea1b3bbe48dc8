//! ISO 3166-1 alpha-2 country codes, with a well-defined "unknown" value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A two-letter uppercase country code. Classification misses degrade to
/// [`CountryCode::UNKNOWN`] (`XX`) so downstream aggregation never blocks
/// on missing geodata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    /// The "unknown" classification, used when no range table matches.
    pub const UNKNOWN: Self = Self(*b"XX");

    /// Parse a two-letter uppercase code. Anything else is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() == 2 && bytes.iter().all(|b| b.is_ascii_uppercase()) {
            Some(Self([bytes[0], bytes[1]]))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        // Always two ASCII uppercase bytes by construction.
        std::str::from_utf8(&self.0).unwrap_or("XX")
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for CountryCode {
    fn default() -> Self {
        Self::UNKNOWN
    }
}
