//! Token verification against store-backed caches.
//!
//! Captcha and phone challenges are solved elsewhere (their UIs are external
//! collaborators); the results land in verification caches that the ledger
//! consults at submission time. A failed lookup is a failed verification,
//! never a submission error.

use tally_store::ObjectStore;
use tally_types::TimestampMs;

/// Key of the captcha verification cache (`ip,token,timestamp` lines).
pub const CAPTCHA_CACHE_KEY: &str = "captcha_cache/verifications.csv";

/// Key of the phone verification cache (`timestamp,phone,token` lines).
pub const PHONE_CACHE_KEY: &str = "phone_number/verification.csv";

/// How long a cached captcha verification stays valid.
pub const CAPTCHA_TTL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// How long a phone verification stays valid.
pub const PHONE_TTL_MS: u64 = 31 * 24 * 60 * 60 * 1000;

/// Whether `token` is a live captcha verification for this source address.
pub fn captcha_verified(
    store: &dyn ObjectStore,
    ip: &str,
    token: &str,
    now: TimestampMs,
) -> bool {
    let Ok(data) = store.get_text(CAPTCHA_CACHE_KEY) else {
        return false;
    };
    for line in data.lines().skip(1) {
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < 3 {
            continue;
        }
        if cols[0] == ip && cols[1] == token {
            if let Ok(millis) = cols[2].parse::<u64>() {
                if !TimestampMs::new(millis).has_expired(CAPTCHA_TTL_MS, now) {
                    return true;
                }
            }
        }
    }
    false
}

/// Whether `token` is a live verification for this phone number.
pub fn phone_verified(
    store: &dyn ObjectStore,
    phone: &str,
    token: &str,
    now: TimestampMs,
) -> bool {
    let Ok(data) = store.get_text(PHONE_CACHE_KEY) else {
        return false;
    };
    for line in data.lines().skip(1) {
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < 3 {
            continue;
        }
        if cols[1] == phone && cols[2] == token {
            if let Ok(millis) = cols[0].parse::<u64>() {
                if !TimestampMs::new(millis).has_expired(PHONE_TTL_MS, now) {
                    return true;
                }
            }
        }
    }
    false
}
