//! Batch re-classification sweep.
//!
//! Provider range sets change over time (new cloud ranges, rotated Tor
//! exits, fresh VPN allocations), so the Tor/VPN/cloud columns of already
//! written shards go stale. The sweep walks every shard, recomputes those
//! columns from a current [`ProviderTable`], and writes back only shards
//! with at least one changed row. Undecodable lines are preserved verbatim;
//! rewritten shards carry the current schema header.

use std::sync::Arc;

use tally_geoip::provider::classification_flags;
use tally_geoip::ProviderTable;
use tally_store::ObjectStore;
use tally_types::record::{SchemaVersion, VoteRecord};

use crate::error::AggregateError;

/// What one sweep did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub shards_scanned: usize,
    pub shards_updated: usize,
    pub rows_changed: usize,
}

/// Walks vote shards and refreshes their provider-classification columns.
pub struct Reclassifier {
    store: Arc<dyn ObjectStore>,
}

impl Reclassifier {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Run one sweep with the given provider table. The table's memo cache
    /// is reset first so a rebuilt range set cannot serve stale answers.
    pub fn sweep(&self, providers: &ProviderTable) -> Result<SweepSummary, AggregateError> {
        providers.clear_cache();
        let mut summary = SweepSummary::default();

        for key in self.store.list("votes/")? {
            if !key.ends_with("votes.csv") {
                continue;
            }
            let body = match self.store.get_text(&key) {
                Ok(body) => body,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            summary.shards_scanned += 1;

            let mut lines = body.lines();
            let Some(header) = lines.next() else {
                continue;
            };
            let Ok(version) = SchemaVersion::detect(header) else {
                tracing::warn!(key, "shard with unknown schema skipped by sweep");
                continue;
            };

            let mut changed_rows = 0;
            let mut out_lines: Vec<String> = Vec::new();
            for line in lines {
                if line.trim().is_empty() {
                    continue;
                }
                let Ok(mut record) = VoteRecord::decode(line, version) else {
                    out_lines.push(line.to_string());
                    continue;
                };
                let tag = providers.classify(record.identity.as_str());
                let (is_tor, is_vpn, cloud) = classification_flags(tag.as_deref());
                if record.is_tor != is_tor
                    || record.is_vpn != is_vpn
                    || record.cloud_provider != cloud
                {
                    record.is_tor = is_tor;
                    record.is_vpn = is_vpn;
                    record.cloud_provider = cloud;
                    changed_rows += 1;
                }
                out_lines.push(record.encode());
            }

            if changed_rows > 0 {
                let mut new_body = String::from(SchemaVersion::CURRENT.header());
                new_body.push('\n');
                for line in out_lines {
                    new_body.push_str(&line);
                    new_body.push('\n');
                }
                self.store.put(&key, new_body.as_bytes())?;
                summary.shards_updated += 1;
                summary.rows_changed += changed_rows;
            }
        }

        tracing::info!(
            scanned = summary.shards_scanned,
            updated = summary.shards_updated,
            rows = summary.rows_changed,
            "re-classification sweep finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_nullables::NullObjectStore;
    use tally_types::record::{HEADER_V1, HEADER_V2};

    fn providers() -> ProviderTable {
        ProviderTable::from_ranges([
            ("185.220.101.0/24", "tor", "exit"),
            ("13.0.0.0/8", "aws", "ec2"),
        ])
        .unwrap()
    }

    #[test]
    fn test_sweep_fills_flags() {
        let store = Arc::new(NullObjectStore::new());
        store
            .put(
                "votes/poll=p/ip_prefix=18/votes.csv",
                format!("{HEADER_V2}\n1000,185.220.101.5,p,yes,DE,,,,,0,,\n").as_bytes(),
            )
            .unwrap();
        let summary = Reclassifier::new(store.clone()).sweep(&providers()).unwrap();
        assert_eq!(summary.shards_updated, 1);
        assert_eq!(summary.rows_changed, 1);

        let body = store.get_text("votes/poll=p/ip_prefix=18/votes.csv").unwrap();
        let row = body.lines().nth(1).unwrap();
        let record = VoteRecord::decode(row, SchemaVersion::V2).unwrap();
        assert_eq!(record.is_tor, Some(true));
        assert_eq!(record.is_vpn, Some(false));
    }

    #[test]
    fn test_sweep_upgrades_v1_shards() {
        let store = Arc::new(NullObjectStore::new());
        store
            .put(
                "votes/poll=p/ip_prefix=13/votes.csv",
                format!("{HEADER_V1}\n1000,13.1.2.3,p,yes,US,,,,\n").as_bytes(),
            )
            .unwrap();
        Reclassifier::new(store.clone()).sweep(&providers()).unwrap();
        let body = store.get_text("votes/poll=p/ip_prefix=13/votes.csv").unwrap();
        assert!(body.starts_with(HEADER_V2));
        assert!(body.contains("aws:ec2"));
    }

    #[test]
    fn test_unchanged_shards_not_rewritten() {
        let store = Arc::new(NullObjectStore::new());
        store
            .put(
                "votes/poll=p/ip_prefix=10/votes.csv",
                format!("{HEADER_V2}\n1000,10.0.0.1,p,yes,US,,0,0,,0,,\n").as_bytes(),
            )
            .unwrap();
        let summary = Reclassifier::new(store).sweep(&providers()).unwrap();
        assert_eq!(summary.shards_scanned, 1);
        assert_eq!(summary.shards_updated, 0);
        assert_eq!(summary.rows_changed, 0);
    }

    #[test]
    fn test_undecodable_lines_preserved() {
        let store = Arc::new(NullObjectStore::new());
        store
            .put(
                "votes/poll=p/ip_prefix=18/votes.csv",
                format!("{HEADER_V2}\ngarbled partial line\n1000,185.220.101.5,p,yes,DE,,,,,0,,\n")
                    .as_bytes(),
            )
            .unwrap();
        Reclassifier::new(store.clone()).sweep(&providers()).unwrap();
        let body = store.get_text("votes/poll=p/ip_prefix=18/votes.csv").unwrap();
        assert!(body.contains("garbled partial line"));
    }
}
