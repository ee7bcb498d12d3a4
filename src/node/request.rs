use std::cmp::Ordering;

/// Request admitted by a node
///
/// Ordered by expiry, ties broken by the node-scoped sequence number so that
/// every request has a unique position in the active set.
#[derive(Debug, Clone, Copy)]
pub struct Request {
    sequence: u64,
    arrival: u64,
    duration: u64,
    expiry: u64,
}

impl Request {
    pub fn new(sequence: u64, arrival: u64, duration: u64) -> Self {
        Self {
            sequence,
            arrival,
            duration,
            expiry: arrival.saturating_add(duration),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn arrival(&self) -> u64 {
        self.arrival
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    #[inline]
    pub fn has_expired(&self, now: u64) -> bool {
        now >= self.expiry
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Request {}

impl PartialOrd for Request {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Request {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.expiry.cmp(&other.expiry) {
            Ordering::Equal => self.sequence.cmp(&other.sequence),
            value => value,
        }
    }
}
