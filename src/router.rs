//! Least-connections routing of synthetic arrivals across a node fleet.

use rand::Rng;
use tracing::trace;

use crate::error::{Result, SimulationError};
use crate::node::{AdmissionNode, ThrottlePolicy};
use crate::sample::Sampler;

const MILLIS_PER_TICK: u64 = 1_000;

/// Evenly spaced arrival times for a fixed per-second rate
///
/// Slot `j` of tick `k` arrives at `k * 1000 + round(j * 1000 / n)`, where `n`
/// is the number of requests per second.
///
/// # Examples
///
/// ```
/// use throttle_sim::router::ArrivalSchedule;
///
/// let arrivals: Vec<_> = ArrivalSchedule::new(3).unwrap().take(5).collect();
///
/// assert_eq!(arrivals, vec![0, 333, 667, 1000, 1333]);
/// ```
#[derive(Debug, Clone)]
pub struct ArrivalSchedule {
    per_tick: u64,
    tick: u64,
    slot: u64,
}

impl ArrivalSchedule {
    pub fn new(requests_per_second: u32) -> Result<Self> {
        if requests_per_second == 0 {
            return Err(SimulationError::InvalidRate);
        }

        Ok(Self {
            per_tick: u64::from(requests_per_second),
            tick: 0,
            slot: 0,
        })
    }

    /// Arrival time of the next slot, in milliseconds
    pub fn next_arrival(&mut self) -> u64 {
        // round half up
        let offset = (2 * self.slot * MILLIS_PER_TICK + self.per_tick) / (2 * self.per_tick);
        let arrival = self.tick * MILLIS_PER_TICK + offset;

        self.slot += 1;

        if self.slot == self.per_tick {
            self.tick += 1;
            self.slot = 0;
        }

        arrival
    }
}

impl Iterator for ArrivalSchedule {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_arrival())
    }
}

/// Load balancer in front of a fleet of [`AdmissionNode`]s
#[derive(Debug)]
pub struct Router {
    nodes: Vec<AdmissionNode>,
}

impl Router {
    /// Creates a fleet of `fleet_size` nodes sharing one throttle policy
    pub fn new(fleet_size: usize, policy: ThrottlePolicy, record_breaches: bool) -> Result<Self> {
        if fleet_size == 0 {
            return Err(SimulationError::EmptyFleet);
        }

        Ok(Self {
            nodes: (0..fleet_size)
                .map(|id| AdmissionNode::new(id, policy, record_breaches))
                .collect(),
        })
    }

    pub fn nodes(&self) -> &[AdmissionNode] {
        &self.nodes
    }

    /// Replays every remaining sample as a request at `requests_per_second`
    ///
    /// Returns the number of routed requests. A zero rate is rejected before
    /// anything is drawn from the sampler.
    pub fn allocate<R: Rng>(
        &mut self,
        sampler: &mut Sampler<R>,
        requests_per_second: u32,
    ) -> Result<u64> {
        let mut schedule = ArrivalSchedule::new(requests_per_second)?;
        let mut routed = 0;

        while sampler.has_next() {
            let duration = sampler.next_sample()?;
            let arrival = schedule.next_arrival();
            let node = self.least_connections(arrival);

            let breached = node.incoming_request(duration, arrival);
            trace!(node = node.id(), arrival, duration, breached, "Routed request");

            routed += 1;
        }

        Ok(routed)
    }

    /// Node with the fewest open requests at `now`
    ///
    /// Every node is asked so that all of them cull expired requests. Ties go
    /// to the node created first.
    fn least_connections(&mut self, now: u64) -> &mut AdmissionNode {
        let mut target = 0;
        let mut fewest = usize::MAX;

        for (index, node) in self.nodes.iter_mut().enumerate() {
            let connections = node.current_connections(now);

            if connections < fewest {
                fewest = connections;
                target = index;
            }
        }

        &mut self.nodes[target]
    }
}
