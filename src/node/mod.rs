//! Per-node admission control over fixed throttle windows.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

pub use request::Request;
pub use throttle::ThrottlePolicy;

use crate::error::{Result, SimulationError};
use crate::histogram::DurationHistogram;

mod request;
mod throttle;

/// Snapshot of a node at the moment a request pushed it past its limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Breach {
    at: u64,
    active: usize,
    in_scope: usize,
    limit: u32,
}

impl Breach {
    pub fn new(at: u64, active: usize, in_scope: usize, limit: u32) -> Self {
        Self {
            at,
            active,
            in_scope,
            limit,
        }
    }

    pub fn at(&self) -> u64 {
        self.at
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn in_scope(&self) -> usize {
        self.in_scope
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Breach @ {} with queue size {} of which in scope {} against limit {}",
            self.at, self.active, self.in_scope, self.limit
        )
    }
}

/// Request and breach totals of a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeSummary {
    id: usize,
    requests: u64,
    breaches: u64,
}

impl NodeSummary {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn breaches(&self) -> u64 {
        self.breaches
    }
}

impl fmt::Display for NodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node: {} had {} w/ {} breaches",
            self.id, self.requests, self.breaches
        )
    }
}

/// Worker node guarded by a [`ThrottlePolicy`]
///
/// Every incoming request is counted, since the simulation models offered
/// load and never rejects anything. A request that makes the current window
/// hold more than the allowed number of admissions is flagged as a breach.
///
/// Times are milliseconds since the start of the trial and must be passed in
/// non-decreasing order.
///
/// # Examples
///
/// ```
/// use throttle_sim::node::{AdmissionNode, ThrottlePolicy};
///
/// let mut node = AdmissionNode::new(0, ThrottlePolicy::new(1, 1000).unwrap(), false);
///
/// assert!(!node.incoming_request(50, 0));
/// assert!(node.incoming_request(50, 10));
/// assert_eq!(node.current_connections(55), 1);
/// assert!(!node.incoming_request(50, 1000));
/// ```
#[derive(Debug)]
pub struct AdmissionNode {
    id: usize,
    policy: ThrottlePolicy,
    // open requests, earliest expiry first
    active: BTreeSet<Request>,
    // requests counted against the current window, in arrival order
    in_scope: VecDeque<Request>,
    next_sequence: u64,
    requests: u64,
    breaches: u64,
    breach_log: Option<Vec<Breach>>,
    durations: DurationHistogram,
}

impl AdmissionNode {
    /// Creates a node
    ///
    /// # Arguments
    ///
    /// * `id`: position of the node in its fleet
    /// * `policy`: throttle applied to this node
    /// * `record_breaches`: keep a [`Breach`] record for every breach
    pub fn new(id: usize, policy: ThrottlePolicy, record_breaches: bool) -> Self {
        Self {
            id,
            policy,
            active: BTreeSet::new(),
            in_scope: VecDeque::new(),
            next_sequence: 0,
            requests: 0,
            breaches: 0,
            breach_log: record_breaches.then(Vec::new),
            durations: DurationHistogram::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }

    pub fn request_count(&self) -> u64 {
        self.requests
    }

    pub fn breach_count(&self) -> u64 {
        self.breaches
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.id,
            requests: self.requests,
            breaches: self.breaches,
        }
    }

    pub fn durations(&self) -> &DurationHistogram {
        &self.durations
    }

    /// Recorded breaches
    ///
    /// Fails with [`SimulationError::BreachLogDisabled`] when the node was
    /// created without breach recording, which is different from a log that
    /// is simply empty.
    pub fn breaches(&self) -> Result<&[Breach]> {
        self.breach_log
            .as_deref()
            .ok_or(SimulationError::BreachLogDisabled { node: self.id })
    }

    /// Number of requests still open at `now`
    pub fn current_connections(&mut self, now: u64) -> usize {
        self.cull(now);
        self.active.len()
    }

    /// Number of requests counted against the window of the last cull
    pub fn window_occupancy(&self) -> usize {
        self.in_scope.len()
    }

    /// Admits a request arriving at `arrival` and reports whether it breached
    pub fn incoming_request(&mut self, duration: u64, arrival: u64) -> bool {
        self.requests += 1;
        self.durations.record(duration);

        let request = Request::new(self.next_sequence, arrival, duration);
        self.next_sequence += 1;

        self.active.insert(request);
        self.in_scope.push_back(request);

        self.cull(arrival);

        if self.in_scope.len() <= self.policy.max_admissions() as usize {
            return false;
        }

        self.breaches += 1;

        if let Some(log) = self.breach_log.as_mut() {
            log.push(Breach::new(
                arrival,
                self.active.len(),
                self.in_scope.len(),
                self.policy.max_admissions(),
            ));
        }

        true
    }

    fn cull(&mut self, now: u64) {
        while let Some(request) = self.active.first() {
            if !request.has_expired(now) {
                break;
            }

            self.active.pop_first();
        }

        while let Some(request) = self.in_scope.front() {
            if !self.policy.out_of_scope(request.arrival(), now) {
                break;
            }

            self.in_scope.pop_front();
        }
    }
}
