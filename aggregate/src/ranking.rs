//! The popular-polls ranking cache.
//!
//! A full ranking pass counts every poll's votes (total and trailing seven
//! days), excludes disabled polls, and caches the sorted list for 24 hours.
//! Pages are served from the cache: the top ten stay fixed, the remainder
//! is deterministically shuffled per seed with recently-active polls biased
//! toward the front, then filtered by search terms and tags and paginated.
//! A single-poll refresh recomputes only that poll's counts and patches the
//! cached list in place.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tally_store::ObjectStore;
use tally_types::{PollId, TimestampMs};
use tally_utils::normalize;

use crate::error::AggregateError;
use crate::results::CacheStatus;

/// Object-store key of the ranking cache.
pub const RANKING_CACHE_KEY: &str = "popular_polls/all_polls_cache.json";

/// How long a cached ranking stays valid.
pub const RANKING_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Window for the "recent votes" count.
pub const RECENT_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Entries whose rank never shuffles.
const FIXED_TOP: usize = 10;

/// How many shuffle-pool copies a recently-active poll gets.
const RECENT_BOOST_COPIES: usize = 5;

/// Recent-vote count above which a poll sorts into the active bucket.
const ACTIVE_BUCKET_THRESHOLD: u64 = 2;

/// How many of a poll's most-applied tags participate in tag filtering.
const TOP_TAGS: usize = 2;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TagEntry {
    pub tag: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PollMetadata {
    #[serde(default)]
    pub tags: Vec<TagEntry>,
}

/// One poll's standing in the ranking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RankingEntry {
    pub poll: String,
    pub count: u64,
    pub last_7_days_count: u64,
    #[serde(default)]
    pub metadata: PollMetadata,
}

#[derive(Serialize, Deserialize)]
struct RankingCache {
    timestamp: TimestampMs,
    results: Vec<RankingEntry>,
}

/// Query parameters of the popular-polls interface.
#[derive(Clone, Debug)]
pub struct PopularQuery {
    pub limit: usize,
    pub offset: usize,
    pub seed: u64,
    pub query: Option<String>,
    pub tags: Option<String>,
    pub poll_to_update: Option<String>,
    pub force_refresh: bool,
}

impl Default for PopularQuery {
    fn default() -> Self {
        Self {
            limit: 15,
            offset: 0,
            seed: 1,
            query: None,
            tags: None,
            poll_to_update: None,
            force_refresh: false,
        }
    }
}

/// A served page of the ranking.
#[derive(Clone, Debug, Serialize)]
pub struct RankedPage {
    pub columns: [&'static str; 3],
    pub data: Vec<(String, u64, u64)>,
    #[serde(skip)]
    pub cache: CacheStatus,
    #[serde(skip)]
    pub cache_age_secs: Option<u64>,
}

/// Serves ranked, filtered, paginated poll listings under the TTL cache.
pub struct PopularPolls {
    store: Arc<dyn ObjectStore>,
}

impl PopularPolls {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Serve one page of the ranking per the query.
    pub fn popular(
        &self,
        query: &PopularQuery,
        now: TimestampMs,
    ) -> Result<RankedPage, AggregateError> {
        if !query.force_refresh {
            if let Some(mut cache) = self.load_cache()? {
                let age_ms = cache.timestamp.elapsed_since(now);
                if age_ms < RANKING_TTL_MS {
                    let age_secs = Some(age_ms / 1000);
                    if let Some(raw) = query.poll_to_update.as_deref() {
                        let target = raw.replace(',', "%2C");
                        return self.patch_single(&mut cache, &target, now, age_secs);
                    }
                    let filtered = filter_entries(&cache.results, query);
                    let data = seeded_selection(filtered, query.seed, query.limit, query.offset);
                    return Ok(RankedPage {
                        columns: COLUMNS,
                        data,
                        cache: CacheStatus::Hit,
                        cache_age_secs: age_secs,
                    });
                }
            }
        }

        let results = self.build_ranking(None, now)?;
        let cache = RankingCache {
            timestamp: now,
            results,
        };
        self.write_cache(&cache)?;
        tracing::info!(polls = cache.results.len(), "ranking cache rebuilt");

        let filtered = filter_entries(&cache.results, query);
        let data = seeded_selection(filtered, query.seed, query.limit, query.offset);
        Ok(RankedPage {
            columns: COLUMNS,
            data,
            cache: CacheStatus::Miss,
            cache_age_secs: None,
        })
    }

    /// Recompute one poll's counts, patch the cached list, and answer with
    /// just that poll's fresh numbers.
    fn patch_single(
        &self,
        cache: &mut RankingCache,
        target: &str,
        now: TimestampMs,
        age_secs: Option<u64>,
    ) -> Result<RankedPage, AggregateError> {
        let fresh = self.build_ranking(Some(target), now)?;
        let fresh_entry = fresh.into_iter().find(|e| e.poll == target);

        if let Some(entry) = fresh_entry.clone() {
            match cache.results.iter().position(|e| e.poll == target) {
                Some(idx) => cache.results[idx] = entry,
                None => cache.results.push(entry),
            }
            cache.results.sort_by(|a, b| b.count.cmp(&a.count));
            self.write_cache(cache)?;
        }

        let data = fresh_entry
            .into_iter()
            .map(|e| (unescape(&e.poll), e.count, e.last_7_days_count))
            .collect();
        Ok(RankedPage {
            columns: COLUMNS,
            data,
            cache: CacheStatus::Hit,
            cache_age_secs: age_secs,
        })
    }

    /// Count votes per poll across every shard. `specific` restricts the
    /// pass to one poll (the partial-refresh path).
    fn build_ranking(
        &self,
        specific: Option<&str>,
        now: TimestampMs,
    ) -> Result<Vec<RankingEntry>, AggregateError> {
        let recent_cutoff = now.as_millis().saturating_sub(RECENT_WINDOW_MS);
        let mut counts: HashMap<String, u64> = HashMap::new();
        let mut recent: HashMap<String, u64> = HashMap::new();
        let mut disabled: HashSet<String> = HashSet::new();
        let mut checked: HashSet<String> = HashSet::new();

        for key in self.store.list("votes/")? {
            if !key.ends_with("votes.csv") {
                continue;
            }
            let Some(poll) = PollId::from_object_key(&key) else {
                continue;
            };
            let name = poll.as_str().to_string();
            if let Some(wanted) = specific {
                if name != wanted {
                    continue;
                }
            }
            if checked.insert(name.clone()) {
                if self.store.exists(&poll.disabled_key())? {
                    disabled.insert(name.clone());
                }
            }
            if disabled.contains(&name) {
                continue;
            }

            let body = match self.store.get_text(&key) {
                Ok(body) => body,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            let bare = name.strip_prefix("open_").unwrap_or(&name);
            for line in body.lines().skip(1) {
                let cols: Vec<&str> = line.splitn(4, ',').collect();
                if cols.len() < 3 {
                    continue;
                }
                let Ok(millis) = cols[0].parse::<u64>() else {
                    continue;
                };
                if cols[2] != name && cols[2] != bare {
                    continue;
                }
                *counts.entry(name.clone()).or_default() += 1;
                if millis >= recent_cutoff {
                    *recent.entry(name.clone()).or_default() += 1;
                }
            }
        }

        let mut entries: Vec<RankingEntry> = counts
            .into_iter()
            .map(|(name, count)| {
                let metadata = self.load_metadata(&name);
                RankingEntry {
                    last_7_days_count: recent.get(&name).copied().unwrap_or(0),
                    poll: name,
                    count,
                    metadata,
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            let a_active = a.last_7_days_count > ACTIVE_BUCKET_THRESHOLD;
            let b_active = b.last_7_days_count > ACTIVE_BUCKET_THRESHOLD;
            b_active
                .cmp(&a_active)
                .then(b.count.cmp(&a.count))
                .then(a.poll.cmp(&b.poll))
        });
        Ok(entries)
    }

    fn load_metadata(&self, poll_name: &str) -> PollMetadata {
        let key = PollId::from_stored(poll_name).metadata_key();
        match self.store.get_text(&key) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
            Err(_) => PollMetadata::default(),
        }
    }

    fn load_cache(&self) -> Result<Option<RankingCache>, AggregateError> {
        match self.store.get_text(RANKING_CACHE_KEY) {
            Ok(data) => Ok(serde_json::from_str(&data).ok()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_cache(&self, cache: &RankingCache) -> Result<(), AggregateError> {
        let body = serde_json::to_vec(cache)
            .map_err(|e| AggregateError::Store(tally_store::StoreError::Backend(e.to_string())))?;
        self.store.put(RANKING_CACHE_KEY, &body)?;
        Ok(())
    }
}

const COLUMNS: [&str; 3] = ["poll", "count", "last_7_days_count"];

fn unescape(poll: &str) -> String {
    poll.replace("%2C", ",")
}

/// Apply free-text search and tag filters to the cached entries.
fn filter_entries(entries: &[RankingEntry], query: &PopularQuery) -> Vec<(String, u64, u64)> {
    let terms: Vec<String> = query
        .query
        .as_deref()
        .unwrap_or("")
        .split_whitespace()
        .map(normalize)
        .collect();
    let tag_filters: Vec<String> = query
        .tags
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();

    entries
        .iter()
        .filter(|entry| {
            if !terms.is_empty() {
                let haystack = normalize(&entry.poll.replace('_', " "));
                if !terms.iter().all(|t| haystack.contains(t.as_str())) {
                    return false;
                }
            }
            if !tag_filters.is_empty() {
                let top = top_tags(&entry.metadata);
                if !tag_filters.iter().any(|t| top.contains(t)) {
                    return false;
                }
            }
            true
        })
        .map(|e| (e.poll.clone(), e.count, e.last_7_days_count))
        .collect()
}

/// The poll's most-applied tags (case-folded), at most [`TOP_TAGS`] of them.
/// Ties break by first application order.
fn top_tags(metadata: &PollMetadata) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut tally: HashMap<String, usize> = HashMap::new();
    for entry in &metadata.tags {
        let tag = entry.tag.to_lowercase();
        if !tally.contains_key(&tag) {
            order.push(tag.clone());
        }
        *tally.entry(tag).or_default() += 1;
    }
    let mut ranked: Vec<(usize, String)> = order.into_iter().enumerate().collect();
    ranked.sort_by(|a, b| tally[&b.1].cmp(&tally[&a.1]).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(TOP_TAGS).map(|(_, tag)| tag).collect()
}

/// Top ten fixed, the rest shuffled per seed with recent activity biased
/// five-fold toward the front, then paginated.
fn seeded_selection(
    data: Vec<(String, u64, u64)>,
    seed: u64,
    limit: usize,
    offset: usize,
) -> Vec<(String, u64, u64)> {
    let fixed: Vec<_> = data.iter().take(FIXED_TOP).cloned().collect();
    let rest: Vec<_> = data.iter().skip(FIXED_TOP).cloned().collect();

    let mut pool: Vec<(String, u64, u64)> = Vec::new();
    for item in rest {
        let copies = if item.2 > 0 { RECENT_BOOST_COPIES } else { 1 };
        for _ in 0..copies {
            pool.push(item.clone());
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut shuffled: Vec<(String, u64, u64)> = Vec::with_capacity(pool.len());
    while !pool.is_empty() {
        let idx = rng.gen_range(0..pool.len());
        shuffled.push(pool.remove(idx));
    }

    // Drop boost duplicates, keeping first occurrence.
    let mut seen: HashSet<String> = fixed.iter().map(|e| e.0.clone()).collect();
    let mut combined = fixed;
    for item in shuffled {
        if seen.insert(item.0.clone()) {
            combined.push(item);
        }
    }

    combined
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|(poll, count, recent)| (unescape(&poll), count, recent))
        .collect()
}
