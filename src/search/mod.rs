//! Convergence loop looking for the smallest breach-free throttle limit.

pub use driver::{BatchResult, SearchDriver, SearchState};
pub use policy::{FixedStep, LimitPolicy, Log2Increment};

mod driver;
mod policy;
