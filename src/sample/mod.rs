//! Weighted, without-replacement sampling of request durations and keys.

pub use bucket::Bucket;
pub use sampler::Sampler;
pub use table::{WeightEntry, WeightTable};

mod bucket;
mod sampler;
mod table;
