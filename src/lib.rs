//! Monte Carlo search for the smallest per-node throttle limit that keeps a
//! least-connections balanced fleet free of rate limit breaches.
//!
//! Each [`Trial`](trial::Trial) replays a synthetic, long-tailed workload
//! through a [`Router`](router::Router) in front of a fleet of
//! [`AdmissionNode`](node::AdmissionNode)s. The
//! [`SearchDriver`](search::SearchDriver) runs batches of independently
//! seeded trials in parallel and raises the limit until a whole batch runs
//! without a breach.
#![warn(missing_debug_implementations, unreachable_pub)]

pub mod cache;
pub mod error;
pub mod histogram;
pub mod node;
pub mod router;
pub mod sample;
pub mod search;
pub mod settings;
pub mod trial;

mod sync;

#[cfg(any(test, feature = "test_util"))]
pub mod test_util;

pub mod prelude {
    pub use crate::error::{Result, SimulationError};
    pub use crate::search::{
        BatchResult, FixedStep, LimitPolicy, Log2Increment, SearchDriver, SearchState,
    };
    pub use crate::settings::SimulationSettings;
    pub use crate::trial::{Trial, TrialConfig, TrialResult};
}
