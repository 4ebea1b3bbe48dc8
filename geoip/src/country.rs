//! Country/ASN geolocation over range-sorted partitions.
//!
//! The full address space is split into partition files, each covering a
//! contiguous span of addresses and holding pre-sorted, non-overlapping
//! `[start, end]` ranges. A lookup selects the partition containing the
//! numeric address, then scans that partition's ranges. IPv4 compares as
//! `u32`, IPv6 as `u128`; both widen to `u128` internally since the
//! conversion preserves ordering.

use std::fs;
use std::path::Path;

use tally_types::identity::{ipv4_to_u32, ipv6_to_u128};
use tally_types::CountryCode;

use crate::GeoError;

/// Geolocation result for one address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpInfo {
    pub country: CountryCode,
    pub country_name: String,
    pub continent: String,
    pub continent_name: String,
    pub asn: Option<String>,
    pub as_name: Option<String>,
    pub as_domain: Option<String>,
}

struct GeoRange {
    start: u128,
    end: u128,
    info: IpInfo,
}

struct Partition {
    start: u128,
    end: u128,
    ranges: Vec<GeoRange>,
}

/// Address family of a partition file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

/// Static, range-sorted IP → country/ASN lookup table.
///
/// Built once at process start and passed by reference into lookups; never
/// mutated afterwards.
pub struct GeoTable {
    v4: Vec<Partition>,
    v6: Vec<Partition>,
}

impl GeoTable {
    /// An empty table; every lookup misses.
    pub fn empty() -> Self {
        Self {
            v4: Vec::new(),
            v6: Vec::new(),
        }
    }

    /// Load every partition file in a directory.
    ///
    /// File names encode family and span: `ipv4_<start>_<end>.csv` or
    /// `ipv6_<start>_<end>.csv`, with `;` standing in for `:` in IPv6
    /// bounds. Each file is a header line followed by
    /// `start,end,country,country_name,continent,continent_name,asn,as_name,as_domain`
    /// rows, pre-sorted by start address.
    pub fn load_dir(dir: &Path) -> Result<Self, GeoError> {
        let mut table = Self::empty();
        let entries = fs::read_dir(dir).map_err(|e| GeoError::Io(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| GeoError::Io(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| GeoError::BadPartitionName(path.display().to_string()))?;
            let mut parts = stem.splitn(3, '_');
            let family = match parts.next() {
                Some("ipv4") => Family::V4,
                Some("ipv6") => Family::V6,
                _ => return Err(GeoError::BadPartitionName(stem.to_string())),
            };
            let (start, end) = match (parts.next(), parts.next()) {
                (Some(s), Some(e)) => (s.replace(';', ":"), e.replace(';', ":")),
                _ => return Err(GeoError::BadPartitionName(stem.to_string())),
            };
            let body = fs::read_to_string(&path).map_err(|e| GeoError::Io(e.to_string()))?;
            table.add_partition(family, &start, &end, &body)?;
        }
        table.finish();
        tracing::info!(
            v4_partitions = table.v4.len(),
            v6_partitions = table.v6.len(),
            "geo table loaded"
        );
        Ok(table)
    }

    /// Add one partition from its span bounds and CSV body (header line
    /// included). Exposed for tests and embedded data sets.
    pub fn add_partition(
        &mut self,
        family: Family,
        start: &str,
        end: &str,
        csv_body: &str,
    ) -> Result<(), GeoError> {
        let parse = |s: &str| -> Result<u128, GeoError> {
            match family {
                Family::V4 => ipv4_to_u32(s)
                    .map(u128::from)
                    .ok_or_else(|| GeoError::BadRange(s.to_string())),
                Family::V6 => ipv6_to_u128(s).ok_or_else(|| GeoError::BadRange(s.to_string())),
            }
        };
        let p_start = parse(start)?;
        let p_end = parse(end)?;
        if p_start > p_end {
            return Err(GeoError::BadRange(format!("{start}..{end}")));
        }

        let mut ranges = Vec::new();
        for line in csv_body.lines().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split(',').collect();
            if cols.len() < 6 {
                continue; // tolerate short rows the same way readers tolerate bad lines
            }
            let (Ok(r_start), Ok(r_end)) = (parse(cols[0]), parse(cols[1])) else {
                continue;
            };
            let non_empty = |s: &str| {
                if s.is_empty() {
                    None
                } else {
                    Some(s.to_string())
                }
            };
            ranges.push(GeoRange {
                start: r_start,
                end: r_end,
                info: IpInfo {
                    country: CountryCode::parse(cols[2]).unwrap_or(CountryCode::UNKNOWN),
                    country_name: cols[3].to_string(),
                    continent: cols[4].to_string(),
                    continent_name: cols[5].to_string(),
                    asn: cols.get(6).and_then(|s| non_empty(s)),
                    as_name: cols.get(7).and_then(|s| non_empty(s)),
                    as_domain: cols.get(8).and_then(|s| non_empty(s)),
                },
            });
        }

        let partition = Partition {
            start: p_start,
            end: p_end,
            ranges,
        };
        match family {
            Family::V4 => self.v4.push(partition),
            Family::V6 => self.v6.push(partition),
        }
        Ok(())
    }

    /// Sort partitions by start address. Call after the last `add_partition`
    /// when building manually; `load_dir` does this itself.
    pub fn finish(&mut self) {
        self.v4.sort_by_key(|p| p.start);
        self.v6.sort_by_key(|p| p.start);
    }

    /// Look up an address. Malformed addresses and uncovered addresses both
    /// return `None`; the caller degrades to the unknown classification.
    pub fn lookup(&self, ip: &str) -> Option<&IpInfo> {
        let (partitions, value) = if ip.contains(':') {
            (&self.v6, ipv6_to_u128(ip)?)
        } else {
            (&self.v4, u128::from(ipv4_to_u32(ip)?))
        };

        // Partitions are sorted and non-overlapping: the candidate is the
        // last one starting at or before the address.
        let idx = partitions.partition_point(|p| p.start <= value);
        let partition = partitions.get(idx.checked_sub(1)?)?;
        if value > partition.end {
            return None;
        }
        partition
            .ranges
            .iter()
            .find(|r| value >= r.start && value <= r.end)
            .map(|r| &r.info)
    }
}
