use hdrhistogram::Histogram;
use tracing::error;

const SIGNIFICANT_FIGURES: u8 = 2;

/// Histogram of sampled request durations in milliseconds
///
/// Filled per node and merged upwards into trial and batch results, so the
/// realized workload can be compared against the nominal weight table.
#[derive(Debug, Clone)]
pub struct DurationHistogram {
    inner: Histogram<u64>,
}

impl Default for DurationHistogram {
    fn default() -> Self {
        Self {
            inner: match Histogram::new(SIGNIFICANT_FIGURES) {
                Ok(histogram) => histogram,
                Err(_) => unreachable!(),
            },
        }
    }
}

impl DurationHistogram {
    #[inline]
    pub fn record(&mut self, duration_ms: u64) {
        if let Err(error) = self.inner.record(duration_ms) {
            error!(duration_ms = ?duration_ms, error = ?error, "Failed to store duration value")
        }
    }

    pub fn merge(&mut self, other: &Self) {
        if let Err(error) = self.inner.add(&other.inner) {
            error!(error = ?error, "Failed to merge duration histograms")
        }
    }

    /// Number of recorded durations
    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Duration at `percentile`, given between 0 and 100
    pub fn percentile(&self, percentile: f64) -> u64 {
        self.inner.value_at_percentile(percentile)
    }

    pub fn max(&self) -> u64 {
        self.inner.max()
    }

    pub fn mean(&self) -> f64 {
        self.inner.mean()
    }

    pub fn value(&self) -> &Histogram<u64> {
        &self.inner
    }
}
