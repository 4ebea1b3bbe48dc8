//! Per-poll aggregation: shard merge, masking, delegation weighting.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tally_delegation::{DelegationResolver, DelegationWeight, GraphSnapshot, SNAPSHOT_KEY};
use tally_store::ObjectStore;
use tally_types::record::decode_shard;
use tally_types::{PollId, TimestampMs, VoteRecord};

use crate::error::AggregateError;
use crate::mask::{mask_phone, strip_forbidden};

/// Header of the aggregated, masked table. Mirrors the shard schema with
/// the identity column renamed and the delegation columns appended.
pub const AGGREGATED_HEADER: &str = "time,masked_ip,poll,vote,country_geoip,asn_name_geoip,is_tor,is_vpn,is_cloud_provider,captcha_verified,phone_number,user_id,delegated_count,delegated_verified_phone_count";

/// Whether a result was served from the cache or rebuilt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Aggregated results for one poll.
#[derive(Clone, Debug)]
pub struct PollResults {
    pub csv: String,
    pub cache: CacheStatus,
}

/// Cache envelope: the masked table plus build metadata. The CSV itself is
/// byte-stable across rebuilds of unchanged shards; only the metadata moves.
#[derive(Serialize, Deserialize)]
struct CacheEnvelope {
    timestamp: TimestampMs,
    csv: String,
}

/// Builds and caches the masked, delegation-weighted view of a poll.
pub struct PollAggregator {
    store: Arc<dyn ObjectStore>,
}

impl PollAggregator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// The aggregated table for `poll`. Reads the cache unless
    /// `force_refresh` is set; either way a rebuild updates the cache.
    pub fn poll_results(
        &self,
        poll: &PollId,
        force_refresh: bool,
        now: TimestampMs,
    ) -> Result<PollResults, AggregateError> {
        let cache_key = poll.results_cache_key();
        if !force_refresh {
            match self.store.get_text(&cache_key) {
                Ok(data) => {
                    if let Ok(envelope) = serde_json::from_str::<CacheEnvelope>(&data) {
                        tracing::debug!(poll = %poll, "results cache hit");
                        return Ok(PollResults {
                            csv: envelope.csv,
                            cache: CacheStatus::Hit,
                        });
                    }
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        let csv = self.build(poll)?;
        let envelope = CacheEnvelope {
            timestamp: now,
            csv: csv.clone(),
        };
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| AggregateError::Store(tally_store::StoreError::Backend(e.to_string())))?;
        self.store.put(&cache_key, &body)?;
        Ok(PollResults {
            csv,
            cache: CacheStatus::Miss,
        })
    }

    /// Merge every shard of the poll into the masked table.
    fn build(&self, poll: &PollId) -> Result<String, AggregateError> {
        let shard_keys = self.store.list(&poll.shard_prefix())?;
        if shard_keys.is_empty() {
            return Err(AggregateError::NoData(poll.to_string()));
        }

        // One snapshot per aggregation run; missing snapshot is zero
        // delegation.
        let snapshot = match self.store.get_text(SNAPSHOT_KEY) {
            Ok(data) => GraphSnapshot::from_json(&data),
            Err(e) if e.is_not_found() => GraphSnapshot::empty(),
            Err(e) => return Err(e.into()),
        };
        let resolver = DelegationResolver::new(&snapshot);

        let mut records: Vec<VoteRecord> = Vec::new();
        for key in &shard_keys {
            let body = match self.store.get_text(key) {
                Ok(body) => body,
                // A shard listed but not yet visible; skip rather than fail.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            match decode_shard(&body) {
                Ok((_, mut shard_records)) => records.append(&mut shard_records),
                Err(e) => {
                    tracing::warn!(key, error = %e, "unreadable shard skipped");
                }
            }
        }
        records.sort_by_key(|r| r.timestamp);

        // One row per distinct voter id, in first-appearance order.
        let mut voters: Vec<String> = Vec::new();
        for record in &records {
            if let Some(user_id) = &record.user_id {
                if !voters.contains(user_id) {
                    voters.push(user_id.clone());
                }
            }
        }
        let weights = resolver.resolve(&voters);
        let weight_of = |user_id: Option<&str>| -> DelegationWeight {
            user_id
                .and_then(|id| voters.iter().position(|v| v == id))
                .map(|i| weights[i])
                .unwrap_or_default()
        };

        let mut csv = String::from(AGGREGATED_HEADER);
        csv.push('\n');
        for record in &records {
            let weight = weight_of(record.user_id.as_deref());
            csv.push_str(&render_row(record, weight));
            csv.push('\n');
        }
        Ok(csv)
    }
}

fn render_row(record: &VoteRecord, weight: DelegationWeight) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        record.timestamp.to_iso8601(),
        record.identity.mask(),
        record.poll.as_str(),
        record.option,
        strip_forbidden(record.country.as_str()),
        strip_forbidden(&record.asn_name),
        flag(record.is_tor),
        flag(record.is_vpn),
        record.cloud_provider.as_deref().unwrap_or(""),
        if record.captcha_verified { "1" } else { "0" },
        record.phone_number.as_deref().map(mask_phone).unwrap_or_default(),
        record.user_id.as_deref().unwrap_or(""),
        weight.delegated_count,
        weight.delegated_verified_phone_count,
    )
}

fn flag(value: Option<bool>) -> &'static str {
    match value {
        None => "",
        Some(false) => "0",
        Some(true) => "1",
    }
}
