//! The vote record codec — versioned, line-oriented shard format.
//!
//! A shard is a header line followed by one encoded record per line. The
//! header selects the schema version; decoding is version-driven rather than
//! positional surgery, so older shards keep decoding after columns are
//! added. New shards are always written with the current schema.

use crate::{CountryCode, PollId, TimestampMs, VoterIdentity};
use thiserror::Error;

/// Header line of the original base schema.
pub const HEADER_V1: &str = "time,ip,poll_,vote,country_geoip,asn_name_geoip,is_tor,is_vpn,is_cloud_provider";

/// Header line of the current schema (adds verification and identity columns).
pub const HEADER_V2: &str = "time,ip,poll_,vote,country_geoip,asn_name_geoip,is_tor,is_vpn,is_cloud_provider,captcha_verified,phone_number,user_id";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("unrecognized shard header: {0}")]
    UnknownSchema(String),

    #[error("malformed record line: {0}")]
    MalformedLine(String),

    #[error("bad timestamp in record line: {0}")]
    BadTimestamp(String),
}

/// Shard schema versions, selected by the shard's header line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    /// The most recent schema; all new shards are written with it.
    pub const CURRENT: Self = Self::V2;

    /// Identify the schema of a shard from its header line.
    ///
    /// Exact known headers match first; otherwise the presence of the
    /// `captcha_verified` column distinguishes V2-family headers from
    /// V1-family ones (shards migrated in place may carry extra columns).
    pub fn detect(header: &str) -> Result<Self, RecordError> {
        let header = header.trim_end();
        if header == HEADER_V2 {
            return Ok(Self::V2);
        }
        if header == HEADER_V1 {
            return Ok(Self::V1);
        }
        if header.starts_with("time,ip,poll_,vote") {
            if header.contains("captcha_verified") {
                return Ok(Self::V2);
            }
            return Ok(Self::V1);
        }
        Err(RecordError::UnknownSchema(header.to_string()))
    }

    pub fn header(&self) -> &'static str {
        match self {
            Self::V1 => HEADER_V1,
            Self::V2 => HEADER_V2,
        }
    }
}

/// One vote, immutable once durably observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteRecord {
    pub timestamp: TimestampMs,
    pub identity: VoterIdentity,
    pub poll: PollId,
    pub option: String,
    pub country: CountryCode,
    pub asn_name: String,
    pub is_tor: Option<bool>,
    pub is_vpn: Option<bool>,
    pub cloud_provider: Option<String>,
    pub captcha_verified: bool,
    pub phone_number: Option<String>,
    pub user_id: Option<String>,
}

impl VoteRecord {
    /// Encode as one line of the current schema (no trailing newline).
    ///
    /// Free-text fields that may carry commas or quotes (AS names do) are
    /// stripped of them so the line stays well-formed.
    pub fn encode(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            self.timestamp.as_millis(),
            self.identity.as_str(),
            self.poll.as_str(),
            self.option,
            strip_separators(self.country.as_str()),
            strip_separators(&self.asn_name),
            encode_flag(self.is_tor),
            encode_flag(self.is_vpn),
            self.cloud_provider.as_deref().unwrap_or(""),
            if self.captcha_verified { "1" } else { "0" },
            self.phone_number.as_deref().unwrap_or(""),
            self.user_id.as_deref().unwrap_or(""),
        )
    }

    /// Decode one line under the given schema version.
    ///
    /// Columns the version does not define decode to their empty values;
    /// extra trailing columns (from in-place migrations) are ignored.
    pub fn decode(line: &str, version: SchemaVersion) -> Result<Self, RecordError> {
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < 4 {
            return Err(RecordError::MalformedLine(line.to_string()));
        }
        let millis: u64 = cols[0]
            .parse()
            .map_err(|_| RecordError::BadTimestamp(line.to_string()))?;
        if cols[1].is_empty() {
            return Err(RecordError::MalformedLine(line.to_string()));
        }

        let field = |i: usize| cols.get(i).copied().unwrap_or("");
        let (captcha, phone, user) = match version {
            SchemaVersion::V1 => (false, None, None),
            SchemaVersion::V2 => (
                field(9) == "1",
                non_empty(field(10)),
                non_empty(field(11)),
            ),
        };

        Ok(Self {
            timestamp: TimestampMs::new(millis),
            identity: VoterIdentity::new(cols[1]),
            poll: PollId::from_stored(cols[2]),
            option: cols[3].to_string(),
            country: CountryCode::parse(field(4)).unwrap_or(CountryCode::UNKNOWN),
            asn_name: field(5).to_string(),
            is_tor: decode_flag(field(6)),
            is_vpn: decode_flag(field(7)),
            cloud_provider: non_empty(field(8)),
            captcha_verified: captcha,
            phone_number: phone,
            user_id: user,
        })
    }
}

/// Decode a whole shard body into its records, skipping malformed lines.
///
/// Returns the detected schema version alongside the records. Malformed
/// lines are a fact of life in shards that raced concurrent writers; they
/// are never fatal to readers.
pub fn decode_shard(body: &str) -> Result<(SchemaVersion, Vec<VoteRecord>), RecordError> {
    let mut lines = body.lines();
    let header = lines.next().ok_or_else(|| RecordError::UnknownSchema(String::new()))?;
    let version = SchemaVersion::detect(header)?;
    let records = lines
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| VoteRecord::decode(line, version).ok())
        .collect();
    Ok((version, records))
}

/// A fresh shard body: the current header and nothing else.
pub fn empty_shard() -> String {
    format!("{}\n", SchemaVersion::CURRENT.header())
}

fn encode_flag(flag: Option<bool>) -> &'static str {
    match flag {
        None => "",
        Some(false) => "0",
        Some(true) => "1",
    }
}

fn decode_flag(s: &str) -> Option<bool> {
    match s {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn strip_separators(s: &str) -> String {
    s.replace([',', '"'], "")
}
