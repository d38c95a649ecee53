//! Wall-clock budgets for search.

use std::time::{Duration, Instant};

/// A point in time by which a move must be produced.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn after(duration: Duration) -> Self {
        Self(Instant::now() + duration)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.0
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Deadline covering `fraction` of the time left, clamped to `0..=1`.
    pub fn fraction(&self, fraction: f64) -> Self {
        let fraction = fraction.clamp(0.0, 1.0);
        Self(Instant::now() + self.remaining().mul_f64(fraction))
    }

    /// This deadline minus a safety margin, never earlier than now.
    pub fn reserve(&self, margin: Duration) -> Self {
        let now = Instant::now();
        match self.0.checked_sub(margin) {
            Some(instant) if instant > now => Self(instant),
            _ => Self(now),
        }
    }

    /// The earlier of two deadlines.
    pub fn min(self, other: Self) -> Self {
        if other.0 < self.0 {
            other
        } else {
            self
        }
    }
}

/// A deadline polled at expansion boundaries.
///
/// [`tick`][SearchClock::tick] counts one expanded node and reads the wall
/// clock every `poll_interval` ticks. Once expired, the clock stays expired.
#[derive(Debug, Clone)]
pub struct SearchClock {
    deadline: Deadline,
    poll_interval: u64,
    nodes: u64,
    expired: bool,
    started: Instant,
}

impl SearchClock {
    pub fn new(deadline: Deadline) -> Self {
        Self {
            deadline,
            poll_interval: 16,
            nodes: 0,
            expired: false,
            started: Instant::now(),
        }
    }

    pub fn with_poll_interval(mut self, interval: u64) -> Self {
        self.poll_interval = interval.max(1);
        self
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn poll_interval(&self) -> u64 {
        self.poll_interval
    }

    /// Nodes counted by [`tick`][SearchClock::tick].
    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Counts a node; returns `true` once the deadline has passed.
    pub fn tick(&mut self) -> bool {
        self.nodes += 1;
        if !self.expired && self.nodes % self.poll_interval == 0 && self.deadline.expired() {
            self.expired = true;
        }
        self.expired
    }

    /// Counts a node and reads the wall clock now, for loops whose
    /// iterations are too long to poll every `poll_interval`.
    pub fn poll(&mut self) -> bool {
        self.nodes += 1;
        self.check()
    }

    /// Reads the wall clock now.
    pub fn check(&mut self) -> bool {
        if !self.expired && self.deadline.expired() {
            self.expired = true;
        }
        self.expired
    }

    /// Latched expiry, without reading the wall clock.
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// A fresh clock for a sub-search, ending no later than this one.
    pub fn child(&self, deadline: Deadline) -> Self {
        let mut child = Self::new(self.deadline.min(deadline)).with_poll_interval(self.poll_interval);
        child.expired = self.expired;
        child
    }

    /// Adds the nodes counted by a child clock.
    pub fn absorb(&mut self, child: &SearchClock) {
        self.nodes += child.nodes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_deadline_reserve_never_in_past() {
        let deadline = Deadline::after(Duration::from_millis(10));
        let reserved = deadline.reserve(Duration::from_secs(1));
        assert!(reserved <= deadline);
        assert!(reserved.remaining() <= Duration::from_millis(1));
    }

    #[test]
    fn test_deadline_fraction() {
        let deadline = Deadline::after(Duration::from_secs(10));
        let half = deadline.fraction(0.5);
        assert!(half < deadline);
        assert!(half.remaining() <= Duration::from_secs(5));
        assert!(half.remaining() >= Duration::from_secs(4));
    }

    #[test]
    fn test_clock_latches() {
        let mut clock = SearchClock::new(Deadline::after(Duration::ZERO)).with_poll_interval(4);
        assert!(!clock.tick());
        assert!(!clock.tick());
        assert!(!clock.tick());
        assert!(clock.tick());
        assert!(clock.is_expired());
        assert_eq!(clock.nodes(), 4);
    }

    #[test]
    fn test_poll_reads_clock_every_time() {
        let mut clock = SearchClock::new(Deadline::after(Duration::ZERO));
        assert!(clock.poll());
        assert_eq!(clock.nodes(), 1);
    }

    #[test]
    fn test_child_clock_is_bounded_by_parent() {
        let parent = SearchClock::new(Deadline::after(Duration::from_millis(50)));
        let child = parent.child(Deadline::after(Duration::from_secs(60)));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
