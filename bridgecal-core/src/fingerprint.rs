//! Fingerprint-based change detection.
//!
//! The fingerprint is a 64-bit truncation of SHA-256 over a canonical text
//! encoding of the content fields. The encoding is fixed for the lifetime of
//! a deployment: changing it would re-mirror every pair on existing installs.

use sha2::{Digest, Sha256};

use crate::event::{BusyStatus, CanonicalEvent, EventTime, Privacy};

/// Compute the content fingerprint of an event.
pub fn fingerprint(event: &CanonicalEvent) -> u64 {
    let digest = Sha256::digest(canonical_text(event).as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// True iff the fields participating in the fingerprint match.
///
/// Defensive re-check; the primary comparison is by fingerprint.
pub fn equals_for_sync(a: &CanonicalEvent, b: &CanonicalEvent) -> bool {
    canonical_text(a) == canonical_text(b)
}

/// Fixed-width lowercase hex form used for storage.
pub fn to_hex(fp: u64) -> String {
    format!("{fp:016x}")
}

/// Parse the stored hex form.
pub fn from_hex(s: &str) -> Option<u64> {
    u64::from_str_radix(s, 16).ok()
}

/// Trim and collapse internal whitespace runs to single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn canonical_text(event: &CanonicalEvent) -> String {
    let busy = match event.busy_status {
        BusyStatus::Busy => "busy",
        BusyStatus::Free => "free",
    };
    let privacy = match event.privacy {
        Privacy::Private => "private",
        Privacy::Public => "public",
    };

    // Unit separator keeps adjacent fields from colliding.
    [
        encode_time(&event.start),
        encode_time(&event.end),
        event.is_all_day().to_string(),
        collapse_whitespace(&event.summary),
        collapse_whitespace(&event.location),
        collapse_whitespace(&event.description),
        busy.to_string(),
        privacy.to_string(),
    ]
    .join("\u{1f}")
}

/// UTC ISO-8601 to whole seconds for instants, YYYY-MM-DD for dates.
fn encode_time(time: &EventTime) -> String {
    match time {
        EventTime::Date(d) => d.format("%Y-%m-%d").to_string(),
        EventTime::Utc(dt) => dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    }
}
