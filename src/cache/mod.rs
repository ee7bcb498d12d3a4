//! Hit rate simulation of a pool of LRU caches under power-law key traffic.

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

pub use popularity::{key_contribution, popularity_templates};

use crate::error::{Result, SimulationError};
use crate::sample::{Bucket, Sampler};
use crate::sync::{Arc, Mutex};

mod popularity;

/// Keys looked up by a single blocking task
const LOOKUP_BATCH: usize = 50;

/// Configuration of a cache simulation
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheSettings {
    keys: u64,
    caches: usize,
    cache_size: usize,
    scale: u64,
    trials: usize,
    workers: usize,
    seed: Option<u64>,
}

impl CacheSettings {
    /// Changes the number of distinct keys
    pub fn with_keys(self, keys: u64) -> Self {
        Self { keys, ..self }
    }

    /// Changes the number of caches lookups are spread over
    pub fn with_caches(self, caches: usize) -> Self {
        Self { caches, ..self }
    }

    /// Changes the capacity of each cache
    pub fn with_cache_size(self, cache_size: usize) -> Self {
        Self { cache_size, ..self }
    }

    /// Multiplies the lookups of every key
    pub fn with_scale(self, scale: u64) -> Self {
        Self { scale, ..self }
    }

    pub fn with_trials(self, trials: usize) -> Self {
        Self { trials, ..self }
    }

    pub fn with_workers(self, workers: usize) -> Self {
        Self { workers, ..self }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    pub fn keys(&self) -> u64 {
        self.keys
    }

    pub fn caches(&self) -> usize {
        self.caches
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// Capacity of each cache, rejecting a zero size
    pub fn capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.cache_size)
            .ok_or(SimulationError::InvalidCache("cache size must be positive"))
    }

    pub fn scale(&self) -> u64 {
        self.scale
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn validate(&self) -> Result<()> {
        if self.keys == 0 {
            return Err(SimulationError::InvalidCache("key population is empty"));
        }

        if self.caches == 0 {
            return Err(SimulationError::InvalidCache("no caches to look keys up in"));
        }

        self.capacity()?;

        if self.trials == 0 {
            return Err(SimulationError::EmptyBatch);
        }

        if self.workers == 0 {
            return Err(SimulationError::NoWorkers);
        }

        Ok(())
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            keys: 100_000,
            caches: 12,
            cache_size: 67_000,
            scale: 1,
            trials: 12,
            workers: 2,
            seed: None,
        }
    }
}

/// Hits and misses of a cache trial
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheTrialResult {
    hits: u64,
    misses: u64,
}

impl CacheTrialResult {
    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Share of lookups served from a cache, zero without lookups
    pub fn hit_ratio(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }

    fn merge(&mut self, other: Self) {
        self.hits += other.hits;
        self.misses += other.misses;
    }
}

impl fmt::Display for CacheTrialResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hits: {} Misses: {}", self.hits, self.misses)
    }
}

/// Caches shared by all lookup tasks of one trial
struct CachePool {
    caches: Vec<Mutex<LruCache<u64, ()>>>,
}

impl CachePool {
    fn new(caches: usize, capacity: NonZeroUsize) -> Self {
        Self {
            caches: (0..caches)
                .map(|_| Mutex::new(LruCache::new(capacity)))
                .collect(),
        }
    }

    /// Looks `key` up in the cache at `index`, returns `true` on a miss
    ///
    /// A hit refreshes the key, a miss inserts it and may evict the least
    /// recently used key.
    fn lookup(&self, index: usize, key: u64) -> bool {
        let mut cache = match self.caches[index].lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };

        if cache.get(&key).is_some() {
            return false;
        }

        cache.put(key, ());
        true
    }

    fn len(&self) -> usize {
        self.caches.len()
    }
}

/// Batch of keys routed to randomly chosen caches
struct Lookup {
    keys: Vec<u64>,
    seed: u64,
    pool: Arc<CachePool>,
}

impl Lookup {
    fn run(self) -> CacheTrialResult {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut result = CacheTrialResult::default();

        for key in self.keys {
            match self.pool.lookup(rng.random_range(0..self.pool.len()), key) {
                true => result.misses += 1,
                false => result.hits += 1,
            }
        }

        result
    }
}

/// Replays the key population against fresh caches once per trial
///
/// Within a trial keys are drawn in sub-batches which run concurrently on a
/// bounded pool of blocking tasks, every key going to a random cache.
#[derive(Debug)]
pub struct CacheSimulation {
    settings: CacheSettings,
    templates: Vec<Bucket>,
    seeder: SmallRng,
}

impl CacheSimulation {
    pub fn new(settings: CacheSettings) -> Result<Self> {
        settings.validate()?;

        let seeder = match settings.seed() {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };

        Ok(Self {
            templates: popularity_templates(settings.keys(), settings.scale()),
            settings,
            seeder,
        })
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Total lookups of a single trial
    pub fn population(&self) -> u64 {
        self.templates.iter().map(Bucket::remaining).sum()
    }

    /// Runs every configured trial one after another
    pub async fn run(&mut self) -> Result<Vec<CacheTrialResult>> {
        let mut results = Vec::with_capacity(self.settings.trials());

        for _ in 0..self.settings.trials() {
            results.push(self.run_trial().await?);
        }

        Ok(results)
    }

    /// Runs a single trial with a fresh seed and empty caches
    pub async fn run_trial(&mut self) -> Result<CacheTrialResult> {
        let seed = self.seeder.random();
        let pool = Arc::new(CachePool::new(
            self.settings.caches(),
            self.settings.capacity()?,
        ));
        let semaphore = std::sync::Arc::new(Semaphore::new(self.settings.workers()));
        let mut sampler = Sampler::seeded(&self.templates, seed);
        let mut tasks = JoinSet::new();
        let mut result = CacheTrialResult::default();

        while sampler.has_next() {
            let mut keys = Vec::with_capacity(LOOKUP_BATCH);

            while keys.len() < LOOKUP_BATCH && sampler.has_next() {
                keys.push(sampler.next_sample()?);
            }

            let lookup = Lookup {
                keys,
                seed: sampler.rng_mut().random(),
                pool: pool.clone(),
            };
            let permit = semaphore.clone().acquire_owned().await?;

            tasks.spawn_blocking(move || {
                let _permit = permit;
                lookup.run()
            });

            while let Some(joined) = tasks.try_join_next() {
                result.merge(joined?);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            result.merge(joined?);
        }

        debug!(seed, lookups = result.lookups(), "Cache trial finished");
        info!(hits = result.hits(), misses = result.misses(), "{result}");

        Ok(result)
    }
}
