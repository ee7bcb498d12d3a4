use std::time::Duration;

use crate::error::{Result, SimulationError};
use crate::node::ThrottlePolicy;
use crate::sample::WeightTable;
use crate::trial::TrialConfig;

/// Configuration of a limit search
///
/// Defaults describe a fleet of 200 nodes taking 160000 requests per minute
/// for one minute, starting the search at 25 admissions per second.
#[derive(Clone, Debug)]
pub struct SimulationSettings {
    fleet_size: usize,
    start_limit: u32,
    window: Duration,
    requests_per_second: u32,
    run_time: Duration,
    batch_size: usize,
    workers: usize,
    weight_table: WeightTable,
    record_breaches: bool,
    seed: Option<u64>,
}

impl SimulationSettings {
    pub fn with_fleet_size(self, fleet_size: usize) -> Self {
        Self { fleet_size, ..self }
    }

    /// Changes the throttle limit of the first round
    pub fn with_start_limit(self, start_limit: u32) -> Self {
        Self {
            start_limit,
            ..self
        }
    }

    /// Changes the throttle window length
    ///
    /// # Arguments
    ///
    /// * `window`: length of each fixed window, truncated to whole milliseconds
    pub fn with_window(self, window: Duration) -> Self {
        Self { window, ..self }
    }

    pub fn with_requests_per_second(self, requests_per_second: u32) -> Self {
        Self {
            requests_per_second,
            ..self
        }
    }

    /// Sets the arrival rate from a per-minute figure, rounding down
    pub fn with_requests_per_minute(self, requests_per_minute: u32) -> Self {
        self.with_requests_per_second(requests_per_minute / 60)
    }

    /// Changes simulated time covered by a single trial
    pub fn with_run_time(self, run_time: Duration) -> Self {
        Self { run_time, ..self }
    }

    /// Changes the number of trials per round
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Changes how many trials may run at the same time
    pub fn with_workers(self, workers: usize) -> Self {
        Self { workers, ..self }
    }

    pub fn with_weight_table(self, weight_table: WeightTable) -> Self {
        Self {
            weight_table,
            ..self
        }
    }

    pub fn with_breach_log(self, record_breaches: bool) -> Self {
        Self {
            record_breaches,
            ..self
        }
    }

    /// Makes a search reproducible by seeding every trial from `seed`
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    pub fn fleet_size(&self) -> usize {
        self.fleet_size
    }

    pub fn start_limit(&self) -> u32 {
        self.start_limit
    }

    pub fn window(&self) -> &Duration {
        &self.window
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }

    pub fn run_time(&self) -> &Duration {
        &self.run_time
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn weight_table(&self) -> &WeightTable {
        &self.weight_table
    }

    pub fn record_breaches(&self) -> bool {
        self.record_breaches
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Number of requests a single trial replays
    pub fn total_samples(&self) -> u64 {
        u64::from(self.requests_per_second) * self.run_time.as_secs()
    }

    /// Rejects settings no trial could run with
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_second == 0 {
            return Err(SimulationError::InvalidRate);
        }

        if self.fleet_size == 0 {
            return Err(SimulationError::EmptyFleet);
        }

        if self.batch_size == 0 {
            return Err(SimulationError::EmptyBatch);
        }

        if self.workers == 0 {
            return Err(SimulationError::NoWorkers);
        }

        if self.window.as_millis() == 0 {
            return Err(SimulationError::InvalidWindow);
        }

        if self.weight_table.is_empty() {
            return Err(SimulationError::EmptyBucketTable);
        }

        Ok(())
    }

    /// Throttle policy for a round at `limit`
    pub fn policy(&self, limit: u32) -> Result<ThrottlePolicy> {
        let window_ms = u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX);

        ThrottlePolicy::new(limit, window_ms)
    }

    /// Shared trial configuration for a round at `limit`
    pub fn trial_config(&self, limit: u32) -> Result<TrialConfig> {
        Ok(TrialConfig::new(
            self.fleet_size,
            self.policy(limit)?,
            self.requests_per_second,
            self.weight_table.templates(self.total_samples()),
        )?
        .with_breach_log(self.record_breaches))
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            fleet_size: 200,
            start_limit: 25,
            window: Duration::from_millis(1000),
            requests_per_second: 160_000 / 60,
            run_time: Duration::from_secs(60),
            batch_size: 12,
            workers: 2,
            weight_table: WeightTable::latency_profile(),
            record_breaches: false,
            seed: None,
        }
    }
}
