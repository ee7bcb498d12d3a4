/// Decides the throttle limit of the next round after a breaching batch
pub trait LimitPolicy {
    /// Next limit to try
    ///
    /// # Arguments
    ///
    /// * `current`: limit of the round that just finished
    /// * `breaches`: total breaches of that round, never zero
    fn next_limit(&self, current: u32, breaches: u64) -> u32;
}

/// Advances by `ceil(log2(breaches))`, at least by one
///
/// # Examples
///
/// ```
/// use throttle_sim::search::{LimitPolicy, Log2Increment};
///
/// assert_eq!(Log2Increment.next_limit(25, 1), 26);
/// assert_eq!(Log2Increment.next_limit(25, 3), 27);
/// assert_eq!(Log2Increment.next_limit(25, 1000), 35);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Log2Increment;

impl LimitPolicy for Log2Increment {
    fn next_limit(&self, current: u32, breaches: u64) -> u32 {
        let step = match breaches {
            0 | 1 => 0,
            n => 64 - (n - 1).leading_zeros(),
        };

        current.saturating_add(step.max(1))
    }
}

/// Advances by the same amount every round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedStep(pub u32);

impl Default for FixedStep {
    fn default() -> Self {
        Self(5)
    }
}

impl LimitPolicy for FixedStep {
    fn next_limit(&self, current: u32, _breaches: u64) -> u32 {
        current.saturating_add(self.0.max(1))
    }
}

impl<P: LimitPolicy + ?Sized> LimitPolicy for &P {
    fn next_limit(&self, current: u32, breaches: u64) -> u32 {
        (**self).next_limit(current, breaches)
    }
}
