use std::fmt;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::{LimitPolicy, Log2Increment};
use crate::error::Result;
use crate::histogram::DurationHistogram;
use crate::settings::SimulationSettings;
use crate::trial::{Trial, TrialResult};

/// Where a search currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    /// Next round runs at `limit`
    Searching { limit: u32 },
    /// A full round at `limit` finished without a single breach
    Converged { limit: u32 },
}

impl SearchState {
    pub fn limit(&self) -> u32 {
        match self {
            Self::Searching { limit } | Self::Converged { limit } => *limit,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Aggregate of every trial in one round
#[derive(Debug, Clone)]
pub struct BatchResult {
    limit: u32,
    trials: Vec<TrialResult>,
    requests: u64,
    breaches: u64,
    durations: DurationHistogram,
}

impl BatchResult {
    fn new(limit: u32, trials: Vec<TrialResult>) -> Self {
        let mut durations = DurationHistogram::default();
        let mut requests = 0;
        let mut breaches = 0;

        for trial in &trials {
            requests += trial.requests();
            breaches += trial.breaches();
            durations.merge(trial.durations());
        }

        Self {
            limit,
            trials,
            requests,
            breaches,
            durations,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Trial results in scheduling order
    pub fn trials(&self) -> &[TrialResult] {
        &self.trials
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn breaches(&self) -> u64 {
        self.breaches
    }

    pub fn durations(&self) -> &DurationHistogram {
        &self.durations
    }

    /// Share of requests that breached, in percent
    pub fn breach_ratio(&self) -> f64 {
        match self.requests {
            0 => 0.0,
            requests => self.breaches as f64 / requests as f64 * 100.0,
        }
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Limit {}: {} requests, {} breaches ({:.2e} %)",
            self.limit,
            self.requests,
            self.breaches,
            self.breach_ratio()
        )
    }
}

/// Raises the per-node throttle limit until a whole batch of trials runs clean
///
/// Every round runs the configured number of trials on a pool of blocking
/// tasks, waits for all of them and then either converges or asks its
/// [`LimitPolicy`] for the next limit.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use throttle_sim::search::SearchDriver;
/// use throttle_sim::settings::SimulationSettings;
///
/// # #[tokio::main(flavor = "multi_thread")]
/// # async fn main() -> throttle_sim::error::Result<()> {
/// let settings = SimulationSettings::default()
///     .with_fleet_size(2)
///     .with_requests_per_second(100)
///     .with_run_time(Duration::from_secs(2))
///     .with_start_limit(1000)
///     .with_batch_size(2)
///     .with_seed(7);
///
/// let mut driver = SearchDriver::new(settings)?;
///
/// assert_eq!(driver.run().await?, 1000);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SearchDriver<P = Log2Increment> {
    settings: SimulationSettings,
    policy: P,
    seeder: SmallRng,
    state: SearchState,
    rounds: usize,
}

impl SearchDriver<Log2Increment> {
    pub fn new(settings: SimulationSettings) -> Result<Self> {
        Self::with_policy(settings, Log2Increment)
    }
}

impl<P> SearchDriver<P>
where
    P: LimitPolicy,
{
    /// Creates a driver advancing the limit with `policy`
    ///
    /// Settings are validated here, so no round is ever scheduled with a
    /// configuration that cannot run.
    pub fn with_policy(settings: SimulationSettings, policy: P) -> Result<Self> {
        settings.validate()?;

        let seeder = match settings.seed() {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };

        Ok(Self {
            state: SearchState::Searching {
                limit: settings.start_limit(),
            },
            settings,
            policy,
            seeder,
            rounds: 0,
        })
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Number of completed rounds
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Runs one round at the current limit
    ///
    /// Returns `None` without running anything once the search converged.
    pub async fn next_round(&mut self) -> Result<Option<BatchResult>> {
        let limit = match self.state {
            SearchState::Converged { .. } => return Ok(None),
            SearchState::Searching { limit } => limit,
        };

        let batch = self.run_batch(limit).await?;
        self.rounds += 1;

        info!(
            limit,
            requests = batch.requests(),
            breaches = batch.breaches(),
            "{batch}"
        );

        self.state = match batch.breaches() {
            0 => SearchState::Converged { limit },
            breaches => SearchState::Searching {
                limit: self.policy.next_limit(limit, breaches),
            },
        };

        Ok(Some(batch))
    }

    /// Runs rounds until one finishes without breaches and returns its limit
    pub async fn run(&mut self) -> Result<u32> {
        while self.next_round().await?.is_some() {}

        Ok(self.state.limit())
    }

    async fn run_batch(&mut self, limit: u32) -> Result<BatchResult> {
        let config = Arc::new(self.settings.trial_config(limit)?);
        let semaphore = Arc::new(Semaphore::new(self.settings.workers()));
        let mut tasks = JoinSet::new();

        info!(
            limit,
            nodes = self.settings.fleet_size(),
            trials = self.settings.batch_size(),
            "Starting round"
        );

        for index in 0..self.settings.batch_size() {
            let permit = semaphore.clone().acquire_owned().await?;
            let trial = Trial::new(config.clone(), self.seeder.random());

            tasks.spawn_blocking(move || {
                let _permit = permit;
                (index, trial.run())
            });
        }

        let trials = collect_trials(limit, tasks, self.settings.batch_size()).await?;

        Ok(BatchResult::new(limit, trials))
    }
}

/// Waits for every trial of a round and puts results back in scheduling order
///
/// The first failed or panicked trial fails the whole round, the remaining
/// tasks are aborted when the set is dropped.
async fn collect_trials(
    limit: u32,
    mut tasks: JoinSet<(usize, Result<TrialResult>)>,
    batch_size: usize,
) -> Result<Vec<TrialResult>> {
    let mut slots: Vec<Option<TrialResult>> = vec![None; batch_size];

    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined?;
        let result = result?;

        info!(limit, seed = result.seed(), "{result}");

        if let Some(detail) = result.breach_detail() {
            for (node, breaches) in detail.iter().filter(|(_, log)| !log.is_empty()) {
                debug!(node, count = breaches.len(), "Breaches: {breaches:?}");
            }
        }

        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(result);
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationError;
    use crate::sample::Bucket;
    use crate::search::FixedStep;
    use crate::test_util::{small_settings, RecordingPolicy};

    fn settings() -> SimulationSettings {
        small_settings(42)
    }

    #[test]
    fn rejects_invalid_settings_before_any_round() {
        assert!(matches!(
            SearchDriver::new(settings().with_batch_size(0)),
            Err(SimulationError::EmptyBatch)
        ));
        assert!(matches!(
            SearchDriver::new(settings().with_workers(0)),
            Err(SimulationError::NoWorkers)
        ));
    }

    #[test]
    fn starts_searching_at_configured_limit() {
        let driver = SearchDriver::new(settings().with_start_limit(17)).unwrap();

        assert_eq!(driver.state(), SearchState::Searching { limit: 17 });
        assert_eq!(driver.rounds(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn converges_in_one_round_when_limit_exceeds_all_traffic() {
        let mut driver = SearchDriver::new(settings().with_start_limit(10_000)).unwrap();

        let batch = driver.next_round().await.unwrap().unwrap();

        assert_eq!(batch.breaches(), 0);
        let per_trial: u64 = driver
            .settings()
            .weight_table()
            .templates(1200)
            .iter()
            .map(Bucket::remaining)
            .sum();

        assert_eq!(batch.trials().len(), 4);
        assert_eq!(batch.requests(), 4 * per_trial);
        assert_eq!(driver.state(), SearchState::Converged { limit: 10_000 });
        assert!(driver.next_round().await.unwrap().is_none());
        assert_eq!(driver.rounds(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn advances_strictly_until_a_round_runs_clean() {
        let mut driver = SearchDriver::new(settings().with_start_limit(1)).unwrap();
        let mut limits = Vec::new();

        while let Some(batch) = driver.next_round().await.unwrap() {
            limits.push((batch.limit(), batch.breaches()));
        }

        assert!(limits.windows(2).all(|pair| pair[0].0 < pair[1].0));
        assert!(limits[..limits.len() - 1].iter().all(|(_, breaches)| *breaches > 0));
        assert_eq!(limits.last().map(|(_, breaches)| *breaches), Some(0));
        assert_eq!(driver.state().limit(), limits[limits.len() - 1].0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn advances_with_log2_of_breaches() {
        let mut driver = SearchDriver::new(settings().with_start_limit(1)).unwrap();

        let batch = driver.next_round().await.unwrap().unwrap();

        assert_eq!(
            driver.state(),
            SearchState::Searching {
                limit: Log2Increment.next_limit(1, batch.breaches())
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn uses_replacement_policy() {
        let mut driver =
            SearchDriver::with_policy(settings().with_start_limit(1), FixedStep(7)).unwrap();

        driver.next_round().await.unwrap();

        assert_eq!(driver.state(), SearchState::Searching { limit: 8 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn consults_policy_only_after_breaching_rounds() {
        let policy: RecordingPolicy = RecordingPolicy::default();
        let mut driver =
            SearchDriver::with_policy(settings().with_start_limit(1), policy.clone()).unwrap();
        let mut batches = Vec::new();

        while let Some(batch) = driver.next_round().await.unwrap() {
            batches.push((batch.limit(), batch.breaches()));
        }

        assert_eq!(policy.calls(), batches[..batches.len() - 1].to_vec());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn same_seed_reproduces_the_search() {
        let first = SearchDriver::new(settings().with_start_limit(1))
            .unwrap()
            .run()
            .await
            .unwrap();
        let second = SearchDriver::new(settings().with_start_limit(1))
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn keeps_trials_in_scheduling_order() {
        let mut driver = SearchDriver::new(settings().with_start_limit(10_000)).unwrap();
        let mut seeder = SmallRng::seed_from_u64(42);
        let expected: Vec<u64> = (0..4).map(|_| seeder.random()).collect();

        let batch = driver.next_round().await.unwrap().unwrap();

        assert_eq!(
            batch.trials().iter().map(TrialResult::seed).collect::<Vec<_>>(),
            expected
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn merges_durations_of_every_trial() {
        let mut driver = SearchDriver::new(settings().with_start_limit(10_000)).unwrap();

        let batch = driver.next_round().await.unwrap().unwrap();

        assert_eq!(batch.durations().len(), batch.requests());
        assert_eq!(batch.breach_ratio(), 0.0);
    }

    #[tokio::test]
    async fn fails_round_when_a_trial_panics() {
        let mut tasks = JoinSet::new();

        tasks.spawn_blocking(|| -> (usize, Result<TrialResult>) { panic!("trial crashed") });

        assert!(matches!(
            collect_trials(1, tasks, 1).await,
            Err(SimulationError::TrialAborted(_))
        ));
    }

    #[tokio::test]
    async fn fails_round_with_the_error_of_a_failed_trial() {
        let mut tasks = JoinSet::new();

        tasks.spawn_blocking(|| (0, Err(SimulationError::SamplerExhausted)));

        assert!(matches!(
            collect_trials(1, tasks, 1).await,
            Err(SimulationError::SamplerExhausted)
        ));
    }

    #[tokio::test]
    async fn collects_nothing_from_an_empty_round() {
        let tasks = JoinSet::new();

        assert!(collect_trials(1, tasks, 0).await.unwrap().is_empty());
    }
}
