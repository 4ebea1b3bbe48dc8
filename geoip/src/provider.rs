//! Provider classification over CIDR-tagged ranges.
//!
//! Ranges are bucketed by the address's first component (first IPv4 octet
//! as a decimal string, first IPv6 hextet verbatim) so a lookup only scans
//! ranges that could possibly match. Within a bucket, ranges are sorted by
//! prefix length descending, so the first hit is the longest-prefix match.
//!
//! Results are memoized per table instance for the lifetime of one batch
//! run; call [`ProviderTable::clear_cache`] between independent runs.

use std::collections::HashMap;
use std::sync::Mutex;

use tally_types::identity::{expand_ipv6, ipv4_to_u32};

use crate::GeoError;

struct ProviderRange {
    cidr: String,
    prefix_len: u8,
    tag: String,
}

/// CIDR-tagged provider ranges (cloud/VPN/Tor/CDN) with longest-prefix-match
/// classification and a clearable per-run memo cache.
pub struct ProviderTable {
    v4_buckets: HashMap<String, Vec<ProviderRange>>,
    v6_buckets: HashMap<String, Vec<ProviderRange>>,
    memo: Mutex<HashMap<String, Option<String>>>,
}

impl ProviderTable {
    pub fn empty() -> Self {
        Self {
            v4_buckets: HashMap::new(),
            v6_buckets: HashMap::new(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Build from `(cidr, provider, tag)` triples. The classification a
    /// match produces is `provider:tag` (e.g. `aws:ec2`, `mullvad:vpn`).
    pub fn from_ranges<I, S>(ranges: I) -> Result<Self, GeoError>
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: AsRef<str>,
    {
        let mut table = Self::empty();
        for (cidr, provider, tag) in ranges {
            table.add_range(cidr.as_ref(), provider.as_ref(), tag.as_ref())?;
        }
        table.finish();
        Ok(table)
    }

    /// Parse a `ip_prefix,provider,tag` CSV body (header line included).
    pub fn from_csv(body: &str) -> Result<Self, GeoError> {
        let mut table = Self::empty();
        for line in body.lines().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split(',').collect();
            if cols.len() < 3 {
                continue;
            }
            table.add_range(cols[0], cols[1], cols[2])?;
        }
        table.finish();
        Ok(table)
    }

    fn add_range(&mut self, cidr: &str, provider: &str, tag: &str) -> Result<(), GeoError> {
        let (base, bits) = split_cidr(cidr)?;
        let range = ProviderRange {
            cidr: cidr.to_string(),
            prefix_len: bits,
            tag: format!("{provider}:{tag}"),
        };
        if cidr.contains(':') {
            let first = base.split(':').next().unwrap_or("").to_string();
            self.v6_buckets.entry(first).or_default().push(range);
        } else {
            let first = base.split('.').next().unwrap_or("").to_string();
            self.v4_buckets.entry(first).or_default().push(range);
        }
        Ok(())
    }

    /// Sort every bucket most-specific-first. `from_ranges`/`from_csv` call
    /// this themselves.
    pub fn finish(&mut self) {
        for bucket in self.v4_buckets.values_mut() {
            bucket.sort_by(|a, b| b.prefix_len.cmp(&a.prefix_len));
        }
        for bucket in self.v6_buckets.values_mut() {
            bucket.sort_by(|a, b| b.prefix_len.cmp(&a.prefix_len));
        }
    }

    /// Classify an address. Returns the most specific matching range's
    /// `provider:tag`, or `None` when no range contains the address.
    pub fn classify(&self, ip: &str) -> Option<String> {
        if let Some(cached) = self.memo.lock().unwrap().get(ip) {
            return cached.clone();
        }

        let bucket = if ip.contains(':') {
            let first = ip.split(':').next().unwrap_or("");
            self.v6_buckets.get(first)
        } else {
            let first = ip.split('.').next().unwrap_or("");
            self.v4_buckets.get(first)
        };

        let result = bucket.and_then(|ranges| {
            ranges
                .iter()
                .find(|r| cidr_contains(ip, &r.cidr))
                .map(|r| r.tag.clone())
        });

        self.memo.lock().unwrap().insert(ip.to_string(), result.clone());
        result
    }

    /// Drop all memoized answers. Must be called between independent batch
    /// runs so a rebuilt range set cannot serve stale classifications.
    pub fn clear_cache(&self) {
        self.memo.lock().unwrap().clear();
    }
}

/// Split a `provider:tag` classification into the record's three columns:
/// Tor and VPN hits set their flags, everything else is a cloud/CDN tag.
/// An unclassified address is explicitly not-Tor, not-VPN, no provider.
pub fn classification_flags(tag: Option<&str>) -> (Option<bool>, Option<bool>, Option<String>) {
    match tag {
        None => (Some(false), Some(false), None),
        Some(tag) => {
            let is_tor = tag.starts_with("tor:");
            let is_vpn = tag.ends_with(":vpn");
            let cloud = if is_tor || is_vpn {
                None
            } else {
                Some(tag.to_string())
            };
            (Some(is_tor), Some(is_vpn), cloud)
        }
    }
}

/// Whether `ip` falls inside `cidr`. Families must match; IPv4 masks the
/// low bits as integers, IPv6 compares whole prefix bytes then masks the
/// partial trailing byte.
pub fn cidr_contains(ip: &str, cidr: &str) -> bool {
    let ip_v6 = ip.contains(':');
    let cidr_v6 = cidr.contains(':');
    if ip_v6 != cidr_v6 {
        return false;
    }

    let Ok((base, bits)) = split_cidr(cidr) else {
        return false;
    };

    if ip_v6 {
        let (Some(ip_hextets), Some(base_hextets)) = (expand_ipv6(ip), expand_ipv6(&base)) else {
            return false;
        };
        let ip_bytes = hextets_to_bytes(ip_hextets);
        let base_bytes = hextets_to_bytes(base_hextets);

        let full_bytes = (bits / 8) as usize;
        if ip_bytes[..full_bytes] != base_bytes[..full_bytes] {
            return false;
        }
        let remaining = bits % 8;
        if remaining > 0 {
            let mask = 0xffu8 << (8 - remaining);
            if (ip_bytes[full_bytes] & mask) != (base_bytes[full_bytes] & mask) {
                return false;
            }
        }
        true
    } else {
        let (Some(ip_int), Some(base_int)) = (ipv4_to_u32(ip), ipv4_to_u32(&base)) else {
            return false;
        };
        let mask = if bits == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(bits))
        };
        (ip_int & mask) == (base_int & mask)
    }
}

fn split_cidr(cidr: &str) -> Result<(String, u8), GeoError> {
    let mut parts = cidr.splitn(2, '/');
    let base = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GeoError::BadCidr(cidr.to_string()))?;
    let bits: u8 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| GeoError::BadCidr(cidr.to_string()))?;
    let max = if cidr.contains(':') { 128 } else { 32 };
    if bits > max {
        return Err(GeoError::BadCidr(cidr.to_string()));
    }
    Ok((base.to_string(), bits))
}

fn hextets_to_bytes(hextets: [u16; 8]) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    for (i, h) in hextets.iter().enumerate() {
        bytes[i * 2] = (h >> 8) as u8;
        bytes[i * 2 + 1] = (h & 0xff) as u8;
    }
    bytes
}
