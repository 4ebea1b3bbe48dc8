//! Vote submission — validation, cooldown, classification, append-verify.

use std::sync::Arc;

use tally_geoip::provider::classification_flags;
use tally_geoip::{GeoTable, ProviderTable};
use tally_store::ObjectStore;
use tally_types::{CountryCode, PollId, TimestampMs, VoteRecord, VoterIdentity};

use crate::error::SubmitError;
use crate::feed::{FeedEntry, RecentActivitySink};
use crate::shard::{append_line, find_cooldown_conflict, read_or_init, write_and_verify, AppendResult};
use crate::verify::{captcha_verified, phone_verified};

/// A vote submission, as received from the outer interface.
#[derive(Clone, Debug)]
pub struct VoteRequest {
    /// Raw poll name, before escaping.
    pub poll: String,
    /// The chosen option (or free text for open polls).
    pub option: String,
    /// Whether this targets the open (free-text) namespace.
    pub open_namespace: bool,
    /// Self-reported country, validated but not trusted over geolocation.
    pub country_hint: Option<String>,
    /// Captcha challenge token, checked against the verification cache.
    pub captcha_token: Option<String>,
    /// Phone number in E.164 form, only recorded when its token verifies.
    pub phone_number: Option<String>,
    pub phone_token: Option<String>,
    /// Stable pseudonymous id from an authenticated session.
    pub user_id: Option<String>,
    /// The source address of the submission.
    pub identity: VoterIdentity,
}

/// Outcome of an accepted submission.
#[derive(Clone, Debug)]
pub struct VoteReceipt {
    pub record: VoteRecord,
    pub shard_key: String,
}

/// The vote ledger: one instance serves every poll, sharing immutable
/// classification tables and the store handle.
pub struct VoteLedger {
    store: Arc<dyn ObjectStore>,
    geo: Arc<GeoTable>,
    providers: Arc<ProviderTable>,
    feed: Option<Arc<dyn RecentActivitySink>>,
}

impl VoteLedger {
    pub fn new(store: Arc<dyn ObjectStore>, geo: Arc<GeoTable>, providers: Arc<ProviderTable>) -> Self {
        Self {
            store,
            geo,
            providers,
            feed: None,
        }
    }

    /// Attach a recent-activity sink notified of accepted votes.
    pub fn with_feed(mut self, feed: Arc<dyn RecentActivitySink>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Admit one vote. Validation order matters and is part of the
    /// contract: namespace → option format → country hint → disabled
    /// sentinel → cooldown → append-verify.
    pub fn submit(&self, req: &VoteRequest, now: TimestampMs) -> Result<VoteReceipt, SubmitError> {
        let poll = PollId::new(&req.poll, req.open_namespace)?;
        poll.validate_option(&req.option)?;

        if let Some(hint) = req.country_hint.as_deref() {
            if CountryCode::parse(hint).is_none() {
                return Err(SubmitError::InvalidCountryHint(hint.to_string()));
            }
        }

        let partition = req
            .identity
            .partition_key()
            .filter(|_| req.identity.is_valid())
            .ok_or_else(|| SubmitError::InvalidIdentity(req.identity.to_string()))?;

        if self.store.exists(&poll.disabled_key())? {
            return Err(SubmitError::PollDisabled);
        }

        let shard_key = poll.shard_key(&partition);
        let body = read_or_init(self.store.as_ref(), &shard_key)?;
        if let Some(next_eligible) = find_cooldown_conflict(&body, &req.identity, now) {
            tracing::debug!(
                poll = %poll,
                identity = %req.identity.mask(),
                next_eligible = %next_eligible.to_iso8601(),
                "vote rejected by cooldown"
            );
            return Err(SubmitError::DuplicateVote { next_eligible });
        }

        let record = self.build_record(&poll, req, now)?;
        let line = record.encode();
        let new_body = append_line(&body, &line);
        match write_and_verify(self.store.as_ref(), &shard_key, &new_body, &line)? {
            AppendResult::Confirmed => {}
            AppendResult::LostUpdateSuspected => {
                tracing::warn!(%shard_key, "post-write verification failed, vote may be lost");
                return Err(SubmitError::StorageInconsistency);
            }
        }

        if let Some(feed) = &self.feed {
            let entry = FeedEntry {
                poll: poll.as_str().to_string(),
                vote: record.option.clone(),
                timestamp: record.timestamp,
                ip: record.identity.mask_coarse(),
                country: record.country.as_str().to_string(),
            };
            if let Err(e) = feed.record_vote(entry) {
                tracing::warn!(error = %e, "recent-activity update failed, vote unaffected");
            }
        }

        tracing::info!(poll = %poll, %shard_key, "vote registered");
        Ok(VoteReceipt { record, shard_key })
    }

    fn build_record(
        &self,
        poll: &PollId,
        req: &VoteRequest,
        now: TimestampMs,
    ) -> Result<VoteRecord, SubmitError> {
        let ip = req.identity.as_str();
        let info = self.geo.lookup(ip);
        let country = info.map(|i| i.country).unwrap_or(CountryCode::UNKNOWN);
        let asn_name = info
            .and_then(|i| i.as_name.clone())
            .unwrap_or_default();

        let (is_tor, is_vpn, cloud_provider) =
            classification_flags(self.providers.classify(ip).as_deref());

        let captcha = match req.captcha_token.as_deref() {
            Some(token) => captcha_verified(self.store.as_ref(), ip, token, now),
            None => false,
        };
        let verified_phone = match (req.phone_number.as_deref(), req.phone_token.as_deref()) {
            (Some(phone), Some(token)) if phone_verified(self.store.as_ref(), phone, token, now) => {
                Some(phone.to_string())
            }
            _ => None,
        };

        Ok(VoteRecord {
            timestamp: now,
            identity: req.identity.clone(),
            poll: poll.clone(),
            option: req.option.clone(),
            country,
            asn_name,
            is_tor,
            is_vpn,
            cloud_provider,
            captcha_verified: captcha,
            phone_number: verified_phone,
            user_id: req.user_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectReason;
    use crate::shard::COOLDOWN_WINDOW_MS;
    use std::sync::Mutex;
    use tally_geoip::country::Family;
    use tally_nullables::NullObjectStore;
    use tally_store::StoreError;

    fn geo_table() -> Arc<GeoTable> {
        let mut table = GeoTable::empty();
        table
            .add_partition(
                Family::V4,
                "10.0.0.0",
                "10.255.255.255",
                "start,end,country,country_name,continent,continent_name,asn,as_name,as_domain\n\
                 10.0.0.0,10.255.255.255,US,United States,NA,North America,AS1,Example Net,example.net\n",
            )
            .unwrap();
        table.finish();
        Arc::new(table)
    }

    fn provider_table() -> Arc<ProviderTable> {
        Arc::new(
            ProviderTable::from_ranges([
                ("13.0.0.0/8", "aws", "ec2"),
                ("185.220.101.0/24", "tor", "exit"),
            ])
            .unwrap(),
        )
    }

    fn ledger(store: Arc<NullObjectStore>) -> VoteLedger {
        VoteLedger::new(store, geo_table(), provider_table())
    }

    fn request(poll: &str, option: &str, ip: &str) -> VoteRequest {
        VoteRequest {
            poll: poll.to_string(),
            option: option.to_string(),
            open_namespace: false,
            country_hint: None,
            captcha_token: None,
            phone_number: None,
            phone_token: None,
            user_id: None,
            identity: VoterIdentity::new(ip),
        }
    }

    #[test]
    fn test_accepts_and_stamps_classification() {
        let store = Arc::new(NullObjectStore::new());
        let receipt = ledger(store.clone())
            .submit(&request("a_or_b", "a", "10.1.2.3"), TimestampMs::new(1000))
            .unwrap();
        assert_eq!(receipt.record.country.as_str(), "US");
        assert_eq!(receipt.record.asn_name, "Example Net");
        assert_eq!(receipt.record.is_tor, Some(false));
        assert_eq!(receipt.shard_key, "votes/poll=a_or_b/ip_prefix=01/votes.csv");
        let body = store.get_text(&receipt.shard_key).unwrap();
        assert!(body.contains("10.1.2.3"));
    }

    #[test]
    fn test_tor_exit_flagged() {
        let store = Arc::new(NullObjectStore::new());
        let receipt = ledger(store)
            .submit(
                &request("a_or_b", "a", "185.220.101.42"),
                TimestampMs::new(1000),
            )
            .unwrap();
        assert_eq!(receipt.record.is_tor, Some(true));
        assert_eq!(receipt.record.cloud_provider, None);
    }

    #[test]
    fn test_cloud_provider_stamped() {
        let store = Arc::new(NullObjectStore::new());
        let receipt = ledger(store)
            .submit(&request("a_or_b", "a", "13.5.6.7"), TimestampMs::new(1000))
            .unwrap();
        assert_eq!(receipt.record.cloud_provider.as_deref(), Some("aws:ec2"));
    }

    #[test]
    fn test_rejects_unknown_option() {
        let store = Arc::new(NullObjectStore::new());
        let err = ledger(store)
            .submit(&request("a_or_b", "c", "10.1.2.3"), TimestampMs::new(1000))
            .unwrap_err();
        assert_eq!(err.reason(), RejectReason::Validation);
    }

    #[test]
    fn test_rejects_duplicate_within_cooldown() {
        let store = Arc::new(NullObjectStore::new());
        let ledger = ledger(store);
        ledger
            .submit(&request("a_or_b", "a", "10.1.2.3"), TimestampMs::new(1000))
            .unwrap();
        let err = ledger
            .submit(&request("a_or_b", "a", "10.1.2.3"), TimestampMs::new(2000))
            .unwrap_err();
        assert_eq!(err.reason(), RejectReason::DuplicateVote);
        assert_eq!(
            err.next_eligible(),
            Some(TimestampMs::new(1000 + COOLDOWN_WINDOW_MS))
        );
    }

    #[test]
    fn test_accepts_after_cooldown() {
        let store = Arc::new(NullObjectStore::new());
        let ledger = ledger(store);
        ledger
            .submit(&request("a_or_b", "a", "10.1.2.3"), TimestampMs::new(1000))
            .unwrap();
        ledger
            .submit(
                &request("a_or_b", "b", "10.1.2.3"),
                TimestampMs::new(1000 + COOLDOWN_WINDOW_MS),
            )
            .unwrap();
    }

    #[test]
    fn test_ipv6_rotation_within_64_rejected() {
        let store = Arc::new(NullObjectStore::new());
        let ledger = ledger(store);
        ledger
            .submit(
                &request("a_or_b", "a", "2a00:1450:400:821::1"),
                TimestampMs::new(1000),
            )
            .unwrap();
        let err = ledger
            .submit(
                &request("a_or_b", "b", "2a00:1450:400:821:dead::2"),
                TimestampMs::new(2000),
            )
            .unwrap_err();
        assert_eq!(err.reason(), RejectReason::DuplicateVote);
    }

    #[test]
    fn test_rejects_disabled_poll() {
        let store = Arc::new(NullObjectStore::new());
        store.put("votes/poll=a_or_b/disabled", b"").unwrap();
        let err = ledger(store)
            .submit(&request("a_or_b", "a", "10.1.2.3"), TimestampMs::new(1000))
            .unwrap_err();
        assert_eq!(err.reason(), RejectReason::PollDisabled);
    }

    #[test]
    fn test_rejects_open_namespace_creation() {
        let store = Arc::new(NullObjectStore::new());
        let err = ledger(store)
            .submit(
                &request("open_sneaky", "yes", "10.1.2.3"),
                TimestampMs::new(1000),
            )
            .unwrap_err();
        assert_eq!(err.reason(), RejectReason::Validation);
    }

    #[test]
    fn test_open_poll_accepts_free_text() {
        let store = Arc::new(NullObjectStore::new());
        let mut req = request("favorite_language", "Rust", "10.1.2.3");
        req.open_namespace = true;
        let receipt = ledger(store)
            .submit(&req, TimestampMs::new(1000))
            .unwrap();
        assert_eq!(receipt.record.poll.as_str(), "open_favorite_language");
    }

    #[test]
    fn test_rejects_bad_country_hint() {
        let store = Arc::new(NullObjectStore::new());
        let mut req = request("a_or_b", "a", "10.1.2.3");
        req.country_hint = Some("usa".to_string());
        let err = ledger(store)
            .submit(&req, TimestampMs::new(1000))
            .unwrap_err();
        assert_eq!(err.reason(), RejectReason::Validation);
    }

    #[test]
    fn test_rejects_invalid_source_address() {
        let store = Arc::new(NullObjectStore::new());
        let err = ledger(store)
            .submit(&request("a_or_b", "a", "not-an-ip"), TimestampMs::new(1000))
            .unwrap_err();
        assert_eq!(err.reason(), RejectReason::Validation);
    }

    #[test]
    fn test_lost_update_reported_not_retried() {
        let store = Arc::new(NullObjectStore::new());
        store.set_drop_writes(true);
        let err = ledger(store)
            .submit(&request("a_or_b", "a", "10.1.2.3"), TimestampMs::new(1000))
            .unwrap_err();
        assert_eq!(err.reason(), RejectReason::StorageInconsistency);
    }

    struct FailingSink;
    impl RecentActivitySink for FailingSink {
        fn record_vote(&self, _entry: FeedEntry) -> Result<(), StoreError> {
            Err(StoreError::Backend("feed down".into()))
        }
    }

    #[test]
    fn test_feed_failure_does_not_fail_vote() {
        let store = Arc::new(NullObjectStore::new());
        let ledger = ledger(store).with_feed(Arc::new(FailingSink));
        ledger
            .submit(&request("a_or_b", "a", "10.1.2.3"), TimestampMs::new(1000))
            .unwrap();
    }

    struct CapturingSink(Mutex<Vec<FeedEntry>>);
    impl RecentActivitySink for CapturingSink {
        fn record_vote(&self, entry: FeedEntry) -> Result<(), StoreError> {
            self.0.lock().unwrap().push(entry);
            Ok(())
        }
    }

    #[test]
    fn test_feed_receives_masked_identity() {
        let store = Arc::new(NullObjectStore::new());
        let sink = Arc::new(CapturingSink(Mutex::new(Vec::new())));
        let ledger = ledger(store).with_feed(sink.clone());
        ledger
            .submit(&request("a_or_b", "a", "10.1.2.3"), TimestampMs::new(1000))
            .unwrap();
        let entries = sink.0.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].ip.contains("10.1.2.3"));
        assert!(entries[0].ip.ends_with("XXX"));
    }

    #[test]
    fn test_captcha_and_phone_verification_stamped() {
        let store = Arc::new(NullObjectStore::new());
        store
            .put(
                crate::verify::CAPTCHA_CACHE_KEY,
                b"ip,token,timestamp\n10.1.2.3,cap1,500\n",
            )
            .unwrap();
        store
            .put(
                crate::verify::PHONE_CACHE_KEY,
                b"timestamp,phone,token\n500,+15551234567,ph1\n",
            )
            .unwrap();
        let mut req = request("a_or_b", "a", "10.1.2.3");
        req.captcha_token = Some("cap1".to_string());
        req.phone_number = Some("+15551234567".to_string());
        req.phone_token = Some("ph1".to_string());
        let receipt = ledger(store)
            .submit(&req, TimestampMs::new(1000))
            .unwrap();
        assert!(receipt.record.captcha_verified);
        assert_eq!(receipt.record.phone_number.as_deref(), Some("+15551234567"));
    }
}
