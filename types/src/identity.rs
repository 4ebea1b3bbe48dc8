//! Voter identity — the source IP address of a ballot.
//!
//! An identity is the raw address text as observed at write time. Two
//! addresses count as the same identity when they are equal (IPv4) or share
//! the same /64 prefix (IPv6), which frustrates single-operator rotation
//! within one allocation. Read paths mask identities before they leave the
//! system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A voter identity: the textual source address of a vote.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterIdentity(String);

impl VoterIdentity {
    pub fn new(ip: impl Into<String>) -> Self {
        Self(ip.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address family by shape: a colon means IPv6.
    pub fn is_ipv6(&self) -> bool {
        self.0.contains(':')
    }

    /// Whether the address parses as a valid IPv4 or IPv6 address.
    pub fn is_valid(&self) -> bool {
        if self.is_ipv6() {
            expand_ipv6(&self.0).is_some()
        } else {
            ipv4_to_u32(&self.0).is_some()
        }
    }

    /// The first 64 bits of an expanded IPv6 address, normalized as four
    /// zero-padded hextets (`2a00:1450:0400:0821`). `None` for IPv4 or
    /// malformed addresses.
    pub fn prefix64(&self) -> Option<String> {
        let hextets = expand_ipv6(&self.0)?;
        Some(
            hextets[..4]
                .iter()
                .map(|h| format!("{h:04x}"))
                .collect::<Vec<_>>()
                .join(":"),
        )
    }

    /// Whether two addresses count as the same voting identity: IPv4 exact,
    /// IPv6 by /64 prefix. Malformed addresses never match anything.
    pub fn same_identity(&self, other: &VoterIdentity) -> bool {
        match (self.is_ipv6(), other.is_ipv6()) {
            (false, false) => ipv4_to_u32(&self.0).is_some() && self.0 == other.0,
            (true, true) => match (self.prefix64(), other.prefix64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            _ => false,
        }
    }

    /// Shard bucket for this address: the first two characters of the
    /// zero-padded leading component (3-digit pad for the IPv4 octet,
    /// 4-digit pad for the IPv6 hextet). `None` for malformed addresses.
    pub fn partition_key(&self) -> Option<String> {
        if self.0.contains(':') {
            let first = self.0.split(':').next().unwrap_or("");
            let padded = format!("{first:0>4}");
            Some(padded.chars().take(2).collect())
        } else if self.0.contains('.') {
            let first = self.0.split('.').next().unwrap_or("");
            let padded = format!("{first:0>3}");
            Some(padded.chars().take(2).collect())
        } else {
            None
        }
    }

    /// Mask for aggregated output: keep the routing prefix, redact the rest.
    ///
    /// IPv4 keeps the first three octets (`146.103.108.XXX`); IPv6 keeps the
    /// first two hextets and half of the third (`2a00:1450:04XX:XXXX:XXXX:XXXX`).
    pub fn mask(&self) -> String {
        if self.0.contains('.') {
            let parts: Vec<&str> = self.0.split('.').collect();
            format!(
                "{}.{}.{}.XXX",
                parts.first().unwrap_or(&""),
                parts.get(1).unwrap_or(&""),
                parts.get(2).unwrap_or(&"")
            )
        } else {
            let parts: Vec<&str> = self.0.split(':').collect();
            let third = format!("{:0>4}", parts.get(2).unwrap_or(&""));
            let kept: String = third.chars().take(2).collect();
            format!(
                "{}:{}:{}XX:XXXX:XXXX:XXXX",
                parts.first().unwrap_or(&""),
                parts.get(1).unwrap_or(&""),
                kept
            )
        }
    }

    /// Coarser mask used by the public activity feed, which also hides part
    /// of the third component.
    pub fn mask_coarse(&self) -> String {
        if self.0.contains('.') {
            let parts: Vec<&str> = self.0.split('.').collect();
            let third = format!("{:0>3}", parts.get(2).unwrap_or(&""));
            let kept: String = third.chars().take(2).collect();
            format!(
                "{}.{}.{}X.XXX",
                parts.first().unwrap_or(&""),
                parts.get(1).unwrap_or(&""),
                kept
            )
        } else {
            let parts: Vec<&str> = self.0.split(':').collect();
            let third = format!("{:0>4}", parts.get(2).unwrap_or(&""));
            let kept: String = third.chars().take(1).collect();
            format!(
                "{}:{}:{}XXX:XXXX:XXXX:XXXX",
                parts.first().unwrap_or(&""),
                parts.get(1).unwrap_or(&""),
                kept
            )
        }
    }
}

impl fmt::Display for VoterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse an IPv4 address to its numeric value. Strict: exactly four decimal
/// octets, each 0–255, no extra characters.
pub fn ipv4_to_u32(ip: &str) -> Option<u32> {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return None;
    }
    let mut value: u32 = 0;
    for part in parts {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let octet: u32 = part.parse().ok()?;
        if octet > 255 {
            return None;
        }
        value = (value << 8) | octet;
    }
    Some(value)
}

/// Expand an IPv6 address to its eight 16-bit groups.
///
/// Handles at most one `::` (missing groups filled with zero) and strips any
/// zone index. Returns `None` for two `::`, wrong group counts, or groups
/// that are not 1–4 hex digits.
pub fn expand_ipv6(ip: &str) -> Option<[u16; 8]> {
    let ip = ip.split('%').next().unwrap_or("");
    if ip.is_empty() {
        return None;
    }

    let groups: Vec<String> = if ip == "::" {
        vec!["0".to_string(); 8]
    } else if ip.contains("::") {
        let halves: Vec<&str> = ip.split("::").collect();
        if halves.len() != 2 {
            return None; // more than one '::'
        }
        let left: Vec<&str> = if halves[0].is_empty() {
            Vec::new()
        } else {
            halves[0].split(':').collect()
        };
        let right: Vec<&str> = if halves[1].is_empty() {
            Vec::new()
        } else {
            halves[1].split(':').collect()
        };
        if left.len() + right.len() > 8 {
            return None;
        }
        let missing = 8 - left.len() - right.len();
        left.iter()
            .map(|s| s.to_string())
            .chain(std::iter::repeat("0".to_string()).take(missing))
            .chain(right.iter().map(|s| s.to_string()))
            .collect()
    } else {
        ip.split(':').map(|s| s.to_string()).collect()
    };

    if groups.len() != 8 {
        return None;
    }
    let mut hextets = [0u16; 8];
    for (i, group) in groups.iter().enumerate() {
        if group.is_empty() || group.len() > 4 {
            return None;
        }
        hextets[i] = u16::from_str_radix(group, 16).ok()?;
    }
    Some(hextets)
}

/// Convert an IPv6 address to its 128-bit numeric value (order-preserving).
pub fn ipv6_to_u128(ip: &str) -> Option<u128> {
    let hextets = expand_ipv6(ip)?;
    let mut value: u128 = 0;
    for h in hextets {
        value = (value << 16) | h as u128;
    }
    Some(value)
}
