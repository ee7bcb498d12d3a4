use thiserror::Error;
use tokio::task::JoinError;

/// Result alias used across the simulator
pub type Result<T, E = SimulationError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Injection rate must be greater than zero requests per second")]
    InvalidRate,

    #[error("Fleet must contain at least one node")]
    EmptyFleet,

    #[error("Bucket weight table is empty")]
    EmptyBucketTable,

    #[error("Bucket weight table entry {index} is invalid: {reason}")]
    InvalidWeightTable { index: usize, reason: &'static str },

    #[error("Batch must contain at least one trial")]
    EmptyBatch,

    #[error("Worker pool must have at least one worker")]
    NoWorkers,

    #[error("Throttle window length must be greater than zero")]
    InvalidWindow,

    #[error("Cache configuration is invalid: {0}")]
    InvalidCache(&'static str),

    #[error("Sampler has no draws left, check has_next() before drawing")]
    SamplerExhausted,

    #[error("Bucket has no draws left")]
    BucketExhausted,

    #[error("Breach log was not enabled for node {node}")]
    BreachLogDisabled { node: usize },

    #[error("Trial did not complete: {0}")]
    TrialAborted(#[from] JoinError),

    #[error("Worker pool was closed before the batch was scheduled")]
    WorkerPoolClosed,
}

impl From<tokio::sync::AcquireError> for SimulationError {
    fn from(_value: tokio::sync::AcquireError) -> Self {
        SimulationError::WorkerPoolClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_are_distinct_from_configuration_errors() {
        let exhausted = SimulationError::SamplerExhausted;
        let disabled = SimulationError::BreachLogDisabled { node: 3 };

        assert!(matches!(exhausted, SimulationError::SamplerExhausted));
        assert_eq!(
            disabled.to_string(),
            "Breach log was not enabled for node 3"
        );
    }

    #[test]
    fn describes_invalid_table_entry() {
        let error = SimulationError::InvalidWeightTable {
            index: 2,
            reason: "weight must be a finite non-negative percentage",
        };

        assert_eq!(
            error.to_string(),
            "Bucket weight table entry 2 is invalid: weight must be a finite non-negative percentage"
        );
    }
}
