use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use throttle_sim::cache::{CacheSettings, CacheSimulation};
use throttle_sim::error::Result;
use throttle_sim::sample::WeightTable;
use throttle_sim::search::{FixedStep, LimitPolicy, SearchDriver};
use throttle_sim::settings::SimulationSettings;

/// Monte Carlo capacity planning for throttled fleets
#[derive(Parser)]
#[command(name = "throttle-sim")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error), RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for the smallest breach-free per-node throttle limit
    Search(SearchArgs),

    /// Simulate hit rates of a pool of LRU caches
    Cache(CacheArgs),
}

#[derive(Args)]
struct SearchArgs {
    /// Trials running at the same time
    #[arg(short = 'c', long, default_value_t = 2)]
    workers: usize,

    /// Trials per round
    #[arg(short = 's', long, default_value_t = 12)]
    sims: usize,

    /// Simulated seconds per trial
    #[arg(short = 't', long, default_value_t = 60)]
    time: u64,

    /// Number of 100ms duration buckets taken from the latency profile
    #[arg(short = 'b', long, default_value_t = 56)]
    buckets: usize,

    /// Requests per minute across the fleet
    #[arg(short = 'r', long, default_value_t = 160_000)]
    rpm: u32,

    /// Throttle limit of the first round
    #[arg(short = 'l', long, default_value_t = 25)]
    limit: u32,

    /// Nodes behind the balancer
    #[arg(short = 'n', long, default_value_t = 200)]
    nodes: usize,

    /// Throttle window in milliseconds
    #[arg(short = 'w', long, default_value_t = 1000)]
    window: u64,

    /// Print every breach of every trial
    #[arg(short = 'd', long)]
    debug: bool,

    /// Seed making the whole search reproducible
    #[arg(long)]
    seed: Option<u64>,

    /// Raise the limit by a fixed step instead of log2 of the breach count
    #[arg(long)]
    step: Option<u32>,

    /// Give up after this many rounds
    #[arg(long)]
    max_rounds: Option<usize>,
}

#[derive(Args)]
struct CacheArgs {
    /// Lookup tasks running at the same time
    #[arg(short = 'c', long, default_value_t = 2)]
    workers: usize,

    /// Trials to run
    #[arg(short = 's', long, default_value_t = 12)]
    sims: usize,

    /// Distinct keys
    #[arg(short = 'k', long, default_value_t = 100_000)]
    keys: u64,

    /// Caches lookups are spread over
    #[arg(short = 'H', long, default_value_t = 12)]
    caches: usize,

    /// Entries per cache
    #[arg(short = 'z', long, default_value_t = 67_000)]
    size: usize,

    /// Multiplier for the lookups of every key
    #[arg(short = 'n', long, default_value_t = 1)]
    scale: u64,

    /// Seed making all trials reproducible
    #[arg(long)]
    seed: Option<u64>,
}

impl SearchArgs {
    fn settings(&self) -> Result<SimulationSettings> {
        let settings = SimulationSettings::default()
            .with_workers(self.workers)
            .with_batch_size(self.sims)
            .with_run_time(Duration::from_secs(self.time))
            .with_weight_table(WeightTable::latency_profile().truncate(self.buckets)?)
            .with_requests_per_minute(self.rpm)
            .with_start_limit(self.limit)
            .with_fleet_size(self.nodes)
            .with_window(Duration::from_millis(self.window))
            .with_breach_log(self.debug);

        Ok(match self.seed {
            Some(seed) => settings.with_seed(seed),
            None => settings,
        })
    }
}

impl CacheArgs {
    fn settings(&self) -> CacheSettings {
        let settings = CacheSettings::default()
            .with_workers(self.workers)
            .with_trials(self.sims)
            .with_keys(self.keys)
            .with_caches(self.caches)
            .with_cache_size(self.size)
            .with_scale(self.scale);

        match self.seed {
            Some(seed) => settings.with_seed(seed),
            None => settings,
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Search(args) => {
            let settings = args.settings()?;

            match args.step {
                Some(step) => {
                    search(SearchDriver::with_policy(settings, FixedStep(step))?, &args).await
                }
                None => search(SearchDriver::new(settings)?, &args).await,
            }
        }
        Commands::Cache(args) => cache(args.settings()).await,
    }
}

async fn search<P: LimitPolicy>(mut driver: SearchDriver<P>, args: &SearchArgs) -> Result<()> {
    let settings = driver.settings();

    println!(
        "Run-time (s): {} @ {} rpm ({} rps)",
        settings.run_time().as_secs(),
        args.rpm,
        settings.requests_per_second()
    );
    println!(
        "Nodes: {}, trials per round: {}, workers: {}",
        settings.fleet_size(),
        settings.batch_size(),
        settings.workers()
    );

    while args
        .max_rounds
        .map_or(true, |max_rounds| driver.rounds() < max_rounds)
    {
        let Some(batch) = driver.next_round().await? else {
            break;
        };

        println!();
        println!("Throttle limit: {}", batch.limit());

        for trial in batch.trials() {
            println!("{trial}");

            if let Some(detail) = trial.breach_detail() {
                let mut nodes: Vec<_> = detail.iter().filter(|(_, log)| !log.is_empty()).collect();
                nodes.sort_by_key(|(id, _)| **id);

                for (id, breaches) in nodes {
                    println!("Node Id: {id}");

                    for breach in breaches {
                        println!("  {breach}");
                    }
                }
            }
        }

        println!("Total Requests: {}", batch.requests());
        println!("Total Breaches: {}", batch.breaches());
        println!("Breaches vs Total: % {:.2e}", batch.breach_ratio());
        println!(
            "Durations p50/p99/max (ms): {}/{}/{}",
            batch.durations().percentile(50.0),
            batch.durations().percentile(99.0),
            batch.durations().max()
        );
    }

    let state = driver.state();

    println!();
    match state.is_converged() {
        true => println!("Converged at throttle limit: {}", state.limit()),
        false => println!(
            "No convergence after {} rounds, next limit would be: {}",
            driver.rounds(),
            state.limit()
        ),
    }

    Ok(())
}

async fn cache(settings: CacheSettings) -> Result<()> {
    let mut simulation = CacheSimulation::new(settings)?;

    println!(
        "Sims: {} for total keys {} @ cache size {} w/ {} caches at scale: {}",
        settings.trials(),
        settings.keys(),
        settings.cache_size(),
        settings.caches(),
        settings.scale()
    );

    for _ in 0..settings.trials() {
        let result = simulation.run_trial().await?;

        println!("{result} ({:.2} % hits)", result.hit_ratio() * 100.0);
    }

    Ok(())
}
