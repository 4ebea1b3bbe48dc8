//! Integration tests exercising the full vote pipeline:
//! submission → sharded storage → aggregation → delegation weighting →
//! ranking, over the in-memory store.
//!
//! These tests wire together components that are normally only connected
//! inside the daemon, verifying the system works end-to-end — not just
//! in isolation.

use std::sync::Arc;

use tally_aggregate::{CacheStatus, PollAggregator, PopularPolls, PopularQuery, Reclassifier};
use tally_delegation::SNAPSHOT_KEY;
use tally_geoip::country::Family;
use tally_geoip::{GeoTable, ProviderTable};
use tally_ledger::{RecentVotesFeed, VoteLedger, VoteRequest, RECENT_VOTES_KEY};
use tally_nullables::{NullClock, NullObjectStore};
use tally_store::ObjectStore;
use tally_types::{PollId, VoterIdentity};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn geo_table() -> Arc<GeoTable> {
    let mut table = GeoTable::empty();
    table
        .add_partition(
            Family::V4,
            "0.0.0.0",
            "255.255.255.255",
            "start,end,country,country_name,continent,continent_name,asn,as_name,as_domain\n\
             10.0.0.0,10.255.255.255,US,United States,NA,North America,AS1,Example Net,example.net\n\
             20.0.0.0,20.255.255.255,DE,Germany,EU,Europe,AS2,Beispiel Netz,example.de\n",
        )
        .expect("valid partition");
    table.finish();
    Arc::new(table)
}

fn provider_table() -> Arc<ProviderTable> {
    Arc::new(ProviderTable::from_ranges([("185.220.101.0/24", "tor", "exit")]).expect("valid ranges"))
}

fn pipeline(store: Arc<NullObjectStore>) -> (VoteLedger, PollAggregator, PopularPolls) {
    let feed = Arc::new(RecentVotesFeed::new(store.clone()));
    let ledger =
        VoteLedger::new(store.clone(), geo_table(), provider_table()).with_feed(feed);
    let aggregator = PollAggregator::new(store.clone());
    let popular = PopularPolls::new(store);
    (ledger, aggregator, popular)
}

fn vote(poll: &str, option: &str, ip: &str, user: Option<&str>) -> VoteRequest {
    VoteRequest {
        poll: poll.to_string(),
        option: option.to_string(),
        open_namespace: false,
        country_hint: None,
        captcha_token: None,
        phone_number: None,
        phone_token: None,
        user_id: user.map(|u| u.to_string()),
        identity: VoterIdentity::new(ip),
    }
}

// ---------------------------------------------------------------------------
// End-to-end flows
// ---------------------------------------------------------------------------

#[test]
fn votes_flow_from_submission_to_masked_table() {
    let store = Arc::new(NullObjectStore::new());
    let clock = NullClock::new(1_740_000_000_000);
    let (ledger, aggregator, _) = pipeline(store.clone());

    ledger
        .submit(&vote("cats_or_dogs", "cats", "10.1.2.3", None), clock.now())
        .expect("first vote accepted");
    clock.advance(1000);
    ledger
        .submit(&vote("cats_or_dogs", "dogs", "20.9.8.7", None), clock.now())
        .expect("second vote accepted");

    // Two distinct partitions, two shards.
    let shards = store.list("votes/poll=cats_or_dogs/ip_prefix=").unwrap();
    assert_eq!(shards.len(), 2);

    let poll = PollId::from_stored("cats_or_dogs");
    let results = aggregator
        .poll_results(&poll, false, clock.now())
        .expect("aggregation succeeds");
    assert_eq!(results.cache, CacheStatus::Miss);

    let lines: Vec<&str> = results.csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains("10.1.2.XXX"));
    assert!(lines[1].contains("Example Net"));
    assert!(lines[2].contains("20.9.8.XXX"));
    assert!(!results.csv.contains("10.1.2.3"));
}

#[test]
fn cooldown_spans_shard_reads_not_process_state() {
    // A fresh ledger instance sees the same shards: the cooldown survives
    // because it lives in storage, not in memory.
    let store = Arc::new(NullObjectStore::new());
    let clock = NullClock::new(1_740_000_000_000);
    {
        let (ledger, _, _) = pipeline(store.clone());
        ledger
            .submit(&vote("cats_or_dogs", "cats", "10.1.2.3", None), clock.now())
            .unwrap();
    }
    let (ledger, _, _) = pipeline(store);
    clock.advance(60_000);
    let err = ledger
        .submit(&vote("cats_or_dogs", "dogs", "10.1.2.3", None), clock.now())
        .unwrap_err();
    assert_eq!(err.reason().as_str(), "duplicate_vote");
}

#[test]
fn delegation_weights_reach_the_served_table() {
    let store = Arc::new(NullObjectStore::new());
    let clock = NullClock::new(1_740_000_000_000);
    store
        .put(
            SNAPSHOT_KEY,
            br#"{
                "alice": { "phoneNumber": "+100" },
                "bob":   { "delegations": { "all": { "target": "alice" } }, "phoneNumber": "+200" },
                "carol": { "delegations": { "all": { "target": "bob" } } }
            }"#,
        )
        .unwrap();
    let (ledger, aggregator, _) = pipeline(store);

    ledger
        .submit(
            &vote("cats_or_dogs", "cats", "10.1.2.3", Some("alice")),
            clock.now(),
        )
        .unwrap();

    let poll = PollId::from_stored("cats_or_dogs");
    let results = aggregator.poll_results(&poll, false, clock.now()).unwrap();
    let row = results.csv.lines().nth(1).unwrap();
    // bob and carol both flow to alice; only bob's phone is verified-unique.
    assert!(row.ends_with(",2,1"));
}

#[test]
fn recent_activity_feed_updates_with_masked_entries() {
    let store = Arc::new(NullObjectStore::new());
    let clock = NullClock::new(1_740_000_000_000);
    let (ledger, _, _) = pipeline(store.clone());

    ledger
        .submit(&vote("cats_or_dogs", "cats", "10.1.2.3", None), clock.now())
        .unwrap();

    let feed = store.get_text(RECENT_VOTES_KEY).unwrap();
    assert!(feed.contains("cats_or_dogs"));
    assert!(!feed.contains("10.1.2.3"));
}

#[test]
fn ranking_reflects_submissions_and_skips_disabled() {
    let store = Arc::new(NullObjectStore::new());
    let clock = NullClock::new(1_740_000_000_000);
    let (ledger, _, popular) = pipeline(store.clone());

    for i in 0..3u8 {
        ledger
            .submit(
                &vote("cats_or_dogs", "cats", &format!("10.1.{i}.1"), None),
                clock.now(),
            )
            .unwrap();
    }
    ledger
        .submit(&vote("tabs_or_spaces", "tabs", "20.0.0.1", None), clock.now())
        .unwrap();
    store.put("votes/poll=tabs_or_spaces/disabled", b"").unwrap();

    let page = popular
        .popular(&PopularQuery::default(), clock.now())
        .unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].0, "cats_or_dogs");
    assert_eq!(page.data[0].1, 3);
}

#[test]
fn disabled_sentinel_blocks_new_votes_immediately() {
    let store = Arc::new(NullObjectStore::new());
    let clock = NullClock::new(1_740_000_000_000);
    let (ledger, _, _) = pipeline(store.clone());

    ledger
        .submit(&vote("cats_or_dogs", "cats", "10.1.2.3", None), clock.now())
        .unwrap();
    store.put("votes/poll=cats_or_dogs/disabled", b"").unwrap();
    let err = ledger
        .submit(&vote("cats_or_dogs", "dogs", "10.9.9.9", None), clock.now())
        .unwrap_err();
    assert_eq!(err.reason().as_str(), "poll_disabled");
}

#[test]
fn reclassification_sweep_feeds_back_into_aggregation() {
    let store = Arc::new(NullObjectStore::new());
    let clock = NullClock::new(1_740_000_000_000);
    let (ledger, aggregator, _) = pipeline(store.clone());

    // Submitted before the Tor range was known: no provider table hit.
    ledger
        .submit(&vote("cats_or_dogs", "cats", "51.222.13.1", None), clock.now())
        .unwrap();

    let updated_providers =
        ProviderTable::from_ranges([("51.222.13.0/24", "tor", "exit")]).unwrap();
    let summary = Reclassifier::new(store.clone())
        .sweep(&updated_providers)
        .unwrap();
    assert_eq!(summary.rows_changed, 1);

    let poll = PollId::from_stored("cats_or_dogs");
    let results = aggregator
        .poll_results(&poll, true, clock.now())
        .unwrap();
    let row = results.csv.lines().nth(1).unwrap();
    let cols: Vec<&str> = row.split(',').collect();
    assert_eq!(cols[6], "1"); // is_tor now set
}
