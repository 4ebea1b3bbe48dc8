//! PII masking and field sanitation for aggregated output.

use tally_types::FORBIDDEN_CHARS;

/// Number of trailing phone digits redacted in aggregated output.
const PHONE_REDACTED_DIGITS: usize = 6;

/// Mask a phone number: keep the prefix, redact the trailing six digits.
/// Numbers too short to keep a prefix redact entirely.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    let keep = chars.len().saturating_sub(PHONE_REDACTED_DIGITS);
    let mut out: String = chars[..keep].iter().collect();
    out.push_str(&"X".repeat(PHONE_REDACTED_DIGITS));
    out
}

/// Strip every forbidden character from a free-text field. AS names and
/// country names can carry characters that would corrupt the table.
pub fn strip_forbidden(s: &str) -> String {
    s.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect()
}
