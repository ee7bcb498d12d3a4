//! Helpers for testing code built on top of the simulator

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::search::{LimitPolicy, Log2Increment};
use crate::settings::SimulationSettings;

/// Settings for a search that finishes within milliseconds
///
/// Four nodes take 400 requests per second for three seconds, four trials
/// per round on two workers, seeded with `seed`.
pub fn small_settings(seed: u64) -> SimulationSettings {
    SimulationSettings::default()
        .with_fleet_size(4)
        .with_requests_per_second(400)
        .with_run_time(Duration::from_secs(3))
        .with_batch_size(4)
        .with_workers(2)
        .with_seed(seed)
}

/// Limit policy that remembers every call before delegating to `P`
#[derive(Debug, Clone, Default)]
pub struct RecordingPolicy<P = Log2Increment> {
    inner: P,
    calls: Arc<Mutex<Vec<(u32, u64)>>>,
}

impl<P> RecordingPolicy<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            calls: Arc::default(),
        }
    }

    /// `(current, breaches)` pairs in call order
    pub fn calls(&self) -> Vec<(u32, u64)> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl<P: LimitPolicy> LimitPolicy for RecordingPolicy<P> {
    fn next_limit(&self, current: u32, breaches: u64) -> u32 {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((current, breaches));
        }

        self.inner.next_limit(current, breaches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::FixedStep;

    #[test]
    fn records_calls_and_delegates() {
        let policy = RecordingPolicy::new(FixedStep(2));
        let handle = policy.clone();

        assert_eq!(policy.next_limit(10, 4), 12);
        assert_eq!(policy.next_limit(12, 1), 14);
        assert_eq!(handle.calls(), vec![(10, 4), (12, 1)]);
    }

    #[test]
    fn small_settings_are_valid() {
        assert!(small_settings(1).validate().is_ok());
    }
}
