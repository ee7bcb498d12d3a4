use crate::error::{Result, SimulationError};

/// Per-node admission limit over fixed, non-overlapping time windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThrottlePolicy {
    max_admissions: u32,
    window_ms: u64,
}

impl ThrottlePolicy {
    /// Creates a throttle policy
    ///
    /// # Arguments
    ///
    /// * `max_admissions`: requests a node may take within one window before breaching
    /// * `window_ms`: window length in milliseconds, must not be zero
    ///
    /// # Examples
    ///
    /// ```
    /// use throttle_sim::node::ThrottlePolicy;
    ///
    /// let policy = ThrottlePolicy::new(50, 1000).unwrap();
    ///
    /// assert_eq!(policy.window_id(999), 0);
    /// assert_eq!(policy.window_id(1000), 1);
    /// ```
    pub fn new(max_admissions: u32, window_ms: u64) -> Result<Self> {
        if window_ms == 0 {
            return Err(SimulationError::InvalidWindow);
        }

        Ok(Self {
            max_admissions,
            window_ms,
        })
    }

    pub fn max_admissions(&self) -> u32 {
        self.max_admissions
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    #[inline]
    pub fn window_id(&self, time: u64) -> u64 {
        time / self.window_ms
    }

    /// Whether a request that arrived at `arrival` no longer counts at `now`
    #[inline]
    pub fn out_of_scope(&self, arrival: u64, now: u64) -> bool {
        self.window_id(now) > self.window_id(arrival)
    }

    /// Same policy with a different admission limit
    pub fn with_max_admissions(self, max_admissions: u32) -> Self {
        Self {
            max_admissions,
            ..self
        }
    }
}
