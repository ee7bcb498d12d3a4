//! Single simulated run at a fixed throttle limit.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Result, SimulationError};
use crate::histogram::DurationHistogram;
use crate::node::{AdmissionNode, Breach, NodeSummary, ThrottlePolicy};
use crate::router::Router;
use crate::sample::{Bucket, Sampler};

/// Everything a trial needs besides its seed
///
/// Shared between all trials of a batch, each trial copies the bucket
/// templates into its own sampler.
#[derive(Debug, Clone)]
pub struct TrialConfig {
    fleet_size: usize,
    policy: ThrottlePolicy,
    requests_per_second: u32,
    record_breaches: bool,
    templates: Arc<[Bucket]>,
}

impl TrialConfig {
    /// Creates a trial configuration
    ///
    /// Rejects a zero rate, an empty fleet and templates without a single
    /// draw, so a trial never allocates nodes or samplers it cannot use.
    ///
    /// # Arguments
    ///
    /// * `fleet_size`: number of nodes behind the router
    /// * `policy`: throttle applied to every node
    /// * `requests_per_second`: arrival rate across the fleet
    /// * `templates`: bucket templates every trial copies into its sampler
    pub fn new(
        fleet_size: usize,
        policy: ThrottlePolicy,
        requests_per_second: u32,
        templates: impl Into<Arc<[Bucket]>>,
    ) -> Result<Self> {
        if requests_per_second == 0 {
            return Err(SimulationError::InvalidRate);
        }

        if fleet_size == 0 {
            return Err(SimulationError::EmptyFleet);
        }

        let templates = templates.into();

        if templates.iter().all(Bucket::is_exhausted) {
            return Err(SimulationError::EmptyBucketTable);
        }

        Ok(Self {
            fleet_size,
            policy,
            requests_per_second,
            record_breaches: false,
            templates,
        })
    }

    /// Keeps per-node breach records in trial results
    pub fn with_breach_log(self, record_breaches: bool) -> Self {
        Self {
            record_breaches,
            ..self
        }
    }

    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }

    pub fn fleet_size(&self) -> usize {
        self.fleet_size
    }
}

/// One complete simulated run
///
/// Owns its sampler, router and nodes for its whole lifetime, so trials can
/// run on different threads without any synchronization.
#[derive(Debug)]
pub struct Trial {
    config: Arc<TrialConfig>,
    seed: u64,
}

impl Trial {
    pub fn new(config: Arc<TrialConfig>, seed: u64) -> Self {
        Self { config, seed }
    }

    pub fn run(self) -> Result<TrialResult> {
        let config = &self.config;
        let mut sampler = Sampler::seeded(&config.templates, self.seed);
        let mut router = Router::new(config.fleet_size, config.policy, config.record_breaches)?;

        router.allocate(&mut sampler, config.requests_per_second)?;

        let mut result = TrialResult::new(
            self.seed,
            config.policy.max_admissions(),
            config.record_breaches,
        );

        for node in router.nodes() {
            result.add_node(node)?;
        }

        debug!(
            seed = result.seed,
            requests = result.requests,
            breaches = result.breaches,
            breached_nodes = result.breached_nodes,
            "Trial finished"
        );

        Ok(result)
    }
}

/// Totals of a single trial
#[derive(Debug, Clone)]
pub struct TrialResult {
    seed: u64,
    limit: u32,
    requests: u64,
    breaches: u64,
    breached_nodes: usize,
    nodes: Vec<NodeSummary>,
    breach_detail: Option<FxHashMap<usize, Vec<Breach>>>,
    durations: DurationHistogram,
}

impl TrialResult {
    fn new(seed: u64, limit: u32, record_breaches: bool) -> Self {
        Self {
            seed,
            limit,
            requests: 0,
            breaches: 0,
            breached_nodes: 0,
            nodes: Vec::new(),
            breach_detail: record_breaches.then(FxHashMap::default),
            durations: DurationHistogram::default(),
        }
    }

    fn add_node(&mut self, node: &AdmissionNode) -> Result<()> {
        self.requests += node.request_count();

        if node.breach_count() > 0 {
            self.breaches += node.breach_count();
            self.breached_nodes += 1;
        }

        self.nodes.push(node.summary());
        self.durations.merge(node.durations());

        if let Some(detail) = self.breach_detail.as_mut() {
            detail.insert(node.id(), node.breaches()?.to_vec());
        }

        Ok(())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn breaches(&self) -> u64 {
        self.breaches
    }

    pub fn breached_nodes(&self) -> usize {
        self.breached_nodes
    }

    /// Per-node totals in fleet order
    pub fn nodes(&self) -> &[NodeSummary] {
        &self.nodes
    }

    /// Breach records keyed by node id, present when the trial logged breaches
    pub fn breach_detail(&self) -> Option<&FxHashMap<usize, Vec<Breach>>> {
        self.breach_detail.as_ref()
    }

    pub fn durations(&self) -> &DurationHistogram {
        &self.durations
    }
}

impl fmt::Display for TrialResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Simulation complete: {} rq w/ {} throttled across {} nodes",
            self.requests, self.breaches, self.breached_nodes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(limit: u32, requests_per_second: u32) -> TrialConfig {
        TrialConfig::new(
            2,
            ThrottlePolicy::new(limit, 1000).unwrap(),
            requests_per_second,
            vec![Bucket::fixed(50, 2000)],
        )
        .unwrap()
    }

    fn run(config: TrialConfig, seed: u64) -> TrialResult {
        Trial::new(Arc::new(config), seed).run().unwrap()
    }

    #[test]
    fn sums_requests_and_breaches_over_all_nodes() {
        let result = run(config(450, 1000), 1);

        assert_eq!(result.requests(), 2000);
        assert_eq!(result.breaches(), 200);
        assert_eq!(result.breached_nodes(), 2);
        assert_eq!(result.limit(), 450);
        assert_eq!(
            result.to_string(),
            "Simulation complete: 2000 rq w/ 200 throttled across 2 nodes"
        );
    }

    #[test]
    fn reports_no_breached_nodes_at_sufficient_limit() {
        let result = run(config(500, 1000), 1);

        assert_eq!((result.breaches(), result.breached_nodes()), (0, 0));
    }

    #[test]
    fn keeps_per_node_detail_in_fleet_order() {
        let result = run(config(200, 100), 1);

        assert_eq!(
            result
                .nodes()
                .iter()
                .map(|node| (node.id(), node.requests()))
                .collect::<Vec<_>>(),
            vec![(0, 1200), (1, 800)]
        );
    }

    #[test]
    fn collects_breach_logs_only_when_requested() {
        let without = run(config(450, 1000), 1);
        let with = run(config(450, 1000).with_breach_log(true), 1);

        assert!(without.breach_detail().is_none());

        let detail = with.breach_detail().unwrap();
        assert_eq!(detail.len(), 2);
        assert_eq!(detail[&0].len(), 100);
        assert_eq!(detail[&1].len(), 100);
    }

    #[test]
    fn merges_sampled_durations_of_all_nodes() {
        let result = run(config(500, 1000), 1);

        assert_eq!(result.durations().len(), 2000);
        assert_eq!(result.durations().max(), 50);
    }

    #[test]
    fn independently_seeded_trials_stay_internally_consistent() {
        let templates = vec![Bucket::ranged(0..100, 3000), Bucket::ranged(100..400, 1000)];
        let config = Arc::new(
            TrialConfig::new(4, ThrottlePolicy::new(200, 1000).unwrap(), 1500, templates).unwrap(),
        );

        for seed in [3, 4] {
            let result = Trial::new(config.clone(), seed).run().unwrap();
            let node_breaches: u64 = result.nodes().iter().map(NodeSummary::breaches).sum();
            let node_requests: u64 = result.nodes().iter().map(NodeSummary::requests).sum();

            assert_eq!(result.seed(), seed);
            assert_eq!(node_breaches, result.breaches());
            assert_eq!(node_requests, 4000);
        }
    }

    #[test]
    fn same_seed_reproduces_the_same_totals() {
        let config = Arc::new(
            TrialConfig::new(
                3,
                ThrottlePolicy::new(100, 1000).unwrap(),
                900,
                vec![Bucket::ranged(0..500, 2500)],
            )
            .unwrap(),
        );

        let first = Trial::new(config.clone(), 77).run().unwrap();
        let second = Trial::new(config, 77).run().unwrap();

        assert_eq!(first.nodes(), second.nodes());
    }

    fn try_config(
        fleet_size: usize,
        requests_per_second: u32,
        templates: Vec<Bucket>,
    ) -> Result<TrialConfig> {
        TrialConfig::new(
            fleet_size,
            ThrottlePolicy::new(10, 1000).unwrap(),
            requests_per_second,
            templates,
        )
    }

    #[test]
    fn rejects_zero_rate_before_building_a_trial() {
        assert!(matches!(
            try_config(2, 0, vec![Bucket::fixed(50, 10)]),
            Err(SimulationError::InvalidRate)
        ));
    }

    #[test]
    fn rejects_empty_fleet_before_building_a_trial() {
        assert!(matches!(
            try_config(0, 1000, vec![Bucket::fixed(50, 10)]),
            Err(SimulationError::EmptyFleet)
        ));
    }

    #[test]
    fn rejects_templates_without_draws() {
        assert!(matches!(
            try_config(2, 1000, Vec::new()),
            Err(SimulationError::EmptyBucketTable)
        ));
        assert!(matches!(
            try_config(2, 1000, vec![Bucket::fixed(50, 0), Bucket::ranged(0..10, 0)]),
            Err(SimulationError::EmptyBucketTable)
        ));
    }
}
