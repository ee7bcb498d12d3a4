use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, SimulationError};

use super::Bucket;

/// Without-replacement sampler over a set of weighted buckets
///
/// Each draw picks a bucket uniformly among the ones with draws left and
/// then a value within it. Choosing over buckets instead of over their
/// remaining population lets the realized distribution drift from the
/// nominal weights once buckets run low. That bias is kept as is.
///
/// # Examples
///
/// ```
/// use throttle_sim::sample::{Bucket, Sampler};
///
/// let templates = [Bucket::fixed(50, 2), Bucket::fixed(100, 1)];
/// let mut sampler = Sampler::seeded(&templates, 42);
/// let mut drawn = Vec::new();
///
/// while sampler.has_next() {
///     drawn.push(sampler.next_sample().unwrap());
/// }
///
/// drawn.sort();
/// assert_eq!(drawn, vec![50, 50, 100]);
/// ```
#[derive(Debug)]
pub struct Sampler<R = SmallRng> {
    buckets: Vec<Bucket>,
    rng: R,
}

impl Sampler<SmallRng> {
    /// Creates a sampler with its own generator seeded from `seed`
    pub fn seeded(templates: &[Bucket], seed: u64) -> Self {
        Self::new(templates, SmallRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Sampler<R> {
    /// Copies `templates` into a new sampler
    ///
    /// Templates without any draws left are skipped.
    pub fn new(templates: &[Bucket], rng: R) -> Self {
        Self {
            buckets: templates
                .iter()
                .filter(|bucket| !bucket.is_exhausted())
                .cloned()
                .collect(),
            rng,
        }
    }

    /// Whether any bucket still has a draw left
    pub fn has_next(&self) -> bool {
        !self.buckets.is_empty()
    }

    /// Total number of draws left across all buckets
    pub fn remaining(&self) -> u64 {
        self.buckets.iter().map(Bucket::remaining).sum()
    }

    /// Draws the next sample
    ///
    /// Drawing from an exhausted sampler is a usage error and returns
    /// [`SimulationError::SamplerExhausted`].
    pub fn next_sample(&mut self) -> Result<u64> {
        if self.buckets.is_empty() {
            return Err(SimulationError::SamplerExhausted);
        }

        let choice = self.rng.random_range(0..self.buckets.len());
        let bucket = &mut self.buckets[choice];
        let sample = bucket.draw(&mut self.rng)?;

        if bucket.is_exhausted() {
            self.buckets.swap_remove(choice);
        }

        Ok(sample)
    }

    /// Generator used for bucket selection, exposed for sub-task seeding
    pub(crate) fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    #[test]
    fn yields_exact_budget_of_two_fixed_buckets() {
        let templates = [Bucket::fixed(50, 2000), Bucket::fixed(100, 2000)];
        let mut sampler = Sampler::seeded(&templates, 1);
        let mut drawn = Vec::new();

        while sampler.has_next() {
            drawn.push(sampler.next_sample().unwrap());
        }

        let counts = drawn.into_iter().counts();

        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&50] + counts[&100], 4000);
        assert_eq!((counts[&50], counts[&100]), (2000, 2000));
    }

    #[test]
    fn ranged_bucket_yields_its_full_budget_within_range() {
        let templates = [Bucket::ranged(0..100, 2000)];
        let mut sampler = Sampler::seeded(&templates, 2);
        let mut total = 0;

        while sampler.has_next() {
            let value = sampler.next_sample().unwrap();
            assert!(value < 100);
            total += 1;
        }

        assert_eq!(total, 2000);
    }

    #[test]
    fn drawing_past_exhaustion_is_an_error() {
        let mut sampler = Sampler::seeded(&[Bucket::fixed(10, 1)], 3);

        sampler.next_sample().unwrap();

        assert!(!sampler.has_next());
        assert!(matches!(
            sampler.next_sample(),
            Err(SimulationError::SamplerExhausted)
        ));
    }

    #[test]
    fn skips_templates_without_budget() {
        let sampler = Sampler::seeded(&[Bucket::fixed(10, 0), Bucket::fixed(20, 3)], 4);

        assert_eq!(sampler.remaining(), 3);
    }

    #[test]
    fn remaining_count_decreases_with_every_draw() {
        let templates = [Bucket::fixed(10, 5), Bucket::ranged(0..10, 5)];
        let mut sampler = Sampler::seeded(&templates, 5);
        let mut previous = sampler.remaining();

        while sampler.has_next() {
            sampler.next_sample().unwrap();
            assert_eq!(sampler.remaining(), previous - 1);
            previous = sampler.remaining();
        }
    }

    #[test]
    fn leaves_templates_untouched() {
        let templates = vec![Bucket::fixed(10, 2)];
        let mut sampler = Sampler::seeded(&templates, 6);

        while sampler.has_next() {
            sampler.next_sample().unwrap();
        }

        assert_eq!(templates[0].remaining(), 2);
    }

    #[test]
    fn same_seed_reproduces_the_same_sequence() {
        let templates = [Bucket::ranged(0..1000, 100), Bucket::fixed(5, 100)];
        let draw_all = |seed| {
            let mut sampler = Sampler::seeded(&templates, seed);
            let mut drawn = Vec::new();
            while sampler.has_next() {
                drawn.push(sampler.next_sample().unwrap());
            }
            drawn
        };

        assert_eq!(draw_all(9), draw_all(9));
    }
}
