//! Hash bucketing primitive
//!
//! Maps a string key deterministically onto `[0, 1)`. Two independent draws
//! are made per assignment decision by suffixing the key, so traffic
//! inclusion and variant pick are statistically independent.
//!
//! The hash must stay fixed for the lifetime of an experiment's traffic;
//! it only seeds the first assignment, the persisted row is authoritative
//! afterwards.

use scribe_exp_types::{ExperimentId, UserId};

/// Deterministic map from a key to `[0, 1)`
///
/// Takes the top 53 bits of the blake3 digest so the result is an exactly
/// representable fraction strictly below 1.0.
#[must_use]
pub fn bucket(key: &str) -> f64 {
    let digest = blake3::hash(key.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest.as_bytes()[..8]);
    let n = u64::from_le_bytes(buf) >> 11;
    (n as f64) / (1u64 << 53) as f64
}

/// Key for the traffic-inclusion draw
#[inline]
#[must_use]
pub fn inclusion_key(user_id: &UserId, experiment_id: ExperimentId) -> String {
    format!("{user_id}:{experiment_id}")
}

/// Key for the variant-selection draw
#[inline]
#[must_use]
pub fn variant_key(user_id: &UserId, experiment_id: ExperimentId) -> String {
    format!("{user_id}:{experiment_id}:variant")
}
