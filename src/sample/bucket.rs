use std::ops::Range;

use rand::Rng;

use crate::error::{Result, SimulationError};

/// Weighted, finite source of samples
///
/// Every variant carries its own remaining-draw budget. Cloning a bucket
/// produces a fully independent copy, so templates can be handed to
/// concurrent trials without aliasing counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bucket {
    /// Always yields the same duration
    Fixed { duration: u64, remaining: u64 },
    /// Yields a duration uniformly from `floor..ceiling`
    Ranged {
        floor: u64,
        ceiling: u64,
        remaining: u64,
    },
    /// Yields an opaque key id, used for cache popularity workloads
    Key { key: u64, remaining: u64 },
}

impl Bucket {
    /// Creates a bucket that yields `duration` exactly `count` times
    ///
    /// # Examples
    ///
    /// ```
    /// use throttle_sim::sample::Bucket;
    ///
    /// let bucket = Bucket::fixed(50, 2000);
    ///
    /// assert_eq!(bucket.remaining(), 2000);
    /// ```
    pub fn fixed(duration: u64, count: u64) -> Self {
        Self::Fixed {
            duration,
            remaining: count,
        }
    }

    /// Creates a bucket that yields values from a half-open millisecond range
    ///
    /// An empty range yields its start value.
    pub fn ranged(range: Range<u64>, count: u64) -> Self {
        Self::Ranged {
            floor: range.start,
            ceiling: range.end,
            remaining: count,
        }
    }

    /// Creates a bucket that yields the same cache key `count` times
    pub fn key(key: u64, count: u64) -> Self {
        Self::Key {
            key,
            remaining: count,
        }
    }

    /// Draws left before the bucket is exhausted
    pub fn remaining(&self) -> u64 {
        match self {
            Self::Fixed { remaining, .. }
            | Self::Ranged { remaining, .. }
            | Self::Key { remaining, .. } => *remaining,
        }
    }

    /// Whether the bucket has no draws left
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Takes one sample from the bucket and decrements its budget
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<u64> {
        let remaining = match self {
            Self::Fixed { remaining, .. }
            | Self::Ranged { remaining, .. }
            | Self::Key { remaining, .. } => remaining,
        };

        *remaining = remaining
            .checked_sub(1)
            .ok_or(SimulationError::BucketExhausted)?;

        Ok(match *self {
            Self::Fixed { duration, .. } => duration,
            Self::Ranged { floor, ceiling, .. } if floor >= ceiling => floor,
            Self::Ranged { floor, ceiling, .. } => rng.random_range(floor..ceiling),
            Self::Key { key, .. } => key,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn fixed_bucket_returns_same_duration_until_exhausted() {
        let mut bucket = Bucket::fixed(50, 2);
        let mut rng = rng();

        assert_eq!(bucket.draw(&mut rng).unwrap(), 50);
        assert_eq!(bucket.draw(&mut rng).unwrap(), 50);
        assert!(bucket.is_exhausted());
        assert!(matches!(
            bucket.draw(&mut rng),
            Err(SimulationError::BucketExhausted)
        ));
    }

    #[test]
    fn ranged_bucket_stays_within_half_open_range() {
        let mut bucket = Bucket::ranged(100..200, 500);
        let mut rng = rng();

        for _ in 0..500 {
            let value = bucket.draw(&mut rng).unwrap();
            assert!((100..200).contains(&value), "{value} is out of range");
        }

        assert_eq!(bucket.remaining(), 0);
    }

    #[test]
    fn empty_range_yields_its_floor() {
        let mut bucket = Bucket::ranged(40..40, 1);

        assert_eq!(bucket.draw(&mut rng()).unwrap(), 40);
    }

    #[test]
    fn key_bucket_yields_its_key() {
        let mut bucket = Bucket::key(17, 3);

        assert_eq!(bucket.draw(&mut rng()).unwrap(), 17);
        assert_eq!(bucket.remaining(), 2);
    }

    #[test]
    fn copies_do_not_share_remaining_budget() {
        let template = Bucket::fixed(10, 3);
        let mut copy = template.clone();

        copy.draw(&mut rng()).unwrap();

        assert_eq!(template.remaining(), 3);
        assert_eq!(copy.remaining(), 2);
    }
}
