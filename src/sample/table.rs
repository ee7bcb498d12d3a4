use crate::error::{Result, SimulationError};

use super::Bucket;

/// Share of requests per 100ms latency range, starting at 0-100ms
///
/// Long tailed, trimmed, so the percentages do not add up to 100.
const LATENCY_PROFILE: [f64; 56] = [
    12.62, 25.58, 9.53, 7.04, 6.15, 5.42, 4.58, 3.74, 3.01, 2.44, 2.01, 1.70, 1.45, 1.25, 1.09,
    0.97, 0.86, 0.77, 0.70, 0.64, 0.59, 0.65, 0.56, 0.50, 0.46, 0.42, 0.38, 0.35, 0.32, 0.29,
    0.26, 0.24, 0.22, 0.20, 0.19, 0.17, 0.16, 0.15, 0.13, 0.12, 0.11, 0.10, 0.10, 0.09, 0.08,
    0.08, 0.07, 0.07, 0.06, 0.06, 0.05, 0.05, 0.05, 0.04, 0.04, 0.04,
];

const LATENCY_PROFILE_STEP_MS: u64 = 100;

/// Entry of a [`WeightTable`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightEntry {
    upper_bound_ms: u64,
    percent: f64,
}

impl WeightEntry {
    /// Creates an entry weighting durations below `upper_bound_ms` by `percent`
    pub fn new(upper_bound_ms: u64, percent: f64) -> Self {
        Self {
            upper_bound_ms,
            percent,
        }
    }

    /// Exclusive upper bound of the duration range in milliseconds
    pub fn upper_bound_ms(&self) -> u64 {
        self.upper_bound_ms
    }

    /// Share of all samples in percent
    pub fn percent(&self) -> f64 {
        self.percent
    }
}

/// Ordered duration distribution as `(upper bound, weight percent)` pairs
///
/// Each entry covers the range between the previous entry upper bound
/// (zero for the first one) and its own upper bound.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    entries: Vec<WeightEntry>,
}

impl WeightTable {
    /// Creates a weight table from `(upper bound ms, percent)` pairs
    ///
    /// # Examples
    ///
    /// ```
    /// use throttle_sim::sample::WeightTable;
    ///
    /// let table = WeightTable::new([(100, 40.0), (200, 35.5)]).unwrap();
    /// let templates = table.templates(1000);
    ///
    /// assert_eq!(templates[0].remaining(), 400);
    /// assert_eq!(templates[1].remaining(), 355);
    /// ```
    pub fn new(entries: impl IntoIterator<Item = (u64, f64)>) -> Result<Self> {
        let entries: Vec<_> = entries
            .into_iter()
            .map(|(upper_bound_ms, percent)| WeightEntry::new(upper_bound_ms, percent))
            .collect();

        if entries.is_empty() {
            return Err(SimulationError::EmptyBucketTable);
        }

        let mut floor = 0;

        for (index, entry) in entries.iter().enumerate() {
            if !entry.percent.is_finite() || entry.percent < 0.0 {
                return Err(SimulationError::InvalidWeightTable {
                    index,
                    reason: "weight must be a finite non-negative percentage",
                });
            }

            if entry.upper_bound_ms <= floor && index > 0 {
                return Err(SimulationError::InvalidWeightTable {
                    index,
                    reason: "upper bounds must be strictly increasing",
                });
            }

            floor = entry.upper_bound_ms;
        }

        Ok(Self { entries })
    }

    /// Built-in long-tailed request latency profile in 100ms steps
    pub fn latency_profile() -> Self {
        Self {
            entries: LATENCY_PROFILE
                .iter()
                .enumerate()
                .map(|(index, percent)| {
                    WeightEntry::new((index as u64 + 1) * LATENCY_PROFILE_STEP_MS, *percent)
                })
                .collect(),
        }
    }

    /// Keeps only the first `max_buckets` entries of the table
    pub fn truncate(self, max_buckets: usize) -> Result<Self> {
        let mut entries = self.entries;
        entries.truncate(max_buckets);

        match entries.is_empty() {
            true => Err(SimulationError::EmptyBucketTable),
            false => Ok(Self { entries }),
        }
    }

    pub fn entries(&self) -> &[WeightEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all weights, below 100 when the tail is truncated
    pub fn total_percent(&self) -> f64 {
        self.entries.iter().map(WeightEntry::percent).sum()
    }

    /// Builds ranged bucket templates sized from `total_samples`
    ///
    /// Every bucket gets at least one draw so that the tail stays represented.
    pub fn templates(&self, total_samples: u64) -> Vec<Bucket> {
        let mut floor = 0;

        self.entries
            .iter()
            .map(|entry| {
                let count = (total_samples as f64 * entry.percent / 100.0).floor() as u64;
                let bucket = Bucket::ranged(floor..entry.upper_bound_ms, count.max(1));
                floor = entry.upper_bound_ms;
                bucket
            })
            .collect()
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self::latency_profile()
    }
}
