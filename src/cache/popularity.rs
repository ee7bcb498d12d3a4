use crate::sample::Bucket;

const POPULARITY_COEFFICIENT: f64 = 2.107e4;
const POPULARITY_EXPONENT: f64 = -0.77;

/// Number of lookups for the key at `rank`, counting ranks from one
///
/// Follows a power law fitted to production key traffic, every key is
/// looked up at least once.
///
/// # Examples
///
/// ```
/// use throttle_sim::cache::key_contribution;
///
/// assert_eq!(key_contribution(1, 1), 21070);
/// assert_eq!(key_contribution(1, 3), 63210);
/// assert_eq!(key_contribution(1_000_000, 1), 1);
/// ```
pub fn key_contribution(rank: u64, scale: u64) -> u64 {
    let lookups = (POPULARITY_COEFFICIENT * (rank as f64).powf(POPULARITY_EXPONENT)) as u64;

    lookups.saturating_mul(scale).max(1)
}

/// One key bucket per rank in `1..=keys`
pub fn popularity_templates(keys: u64, scale: u64) -> Vec<Bucket> {
    (1..=keys)
        .map(|rank| Bucket::key(rank, key_contribution(rank, scale)))
        .collect()
}
