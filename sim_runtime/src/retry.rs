use std::time::Duration;

use tokio::time::Instant;

use crate::intent::ControlDimension;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            max_attempts: 5,
        }
    }
}

/// One retransmission deadline per control dimension.
///
/// The scheduler only tracks deadlines; the session loop sleeps until
/// [`RetryScheduler::next_deadline`] and hands expired dimensions back to the
/// controller, so every firing runs on the same control-flow task.
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    timers: [Option<Instant>; 2],
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            timers: [None; 2],
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Start, or restart, the timer for `dimension`.
    pub fn arm(&mut self, dimension: ControlDimension, now: Instant) {
        self.timers[dimension.index()] = Some(now + self.policy.interval);
    }

    pub fn cancel(&mut self, dimension: ControlDimension) -> bool {
        self.timers[dimension.index()].take().is_some()
    }

    pub fn cancel_all(&mut self) {
        self.timers = [None; 2];
    }

    pub fn is_armed(&self, dimension: ControlDimension) -> bool {
        self.timers[dimension.index()].is_some()
    }

    pub fn deadline(&self, dimension: ControlDimension) -> Option<Instant> {
        self.timers[dimension.index()]
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().flatten().min().copied()
    }

    /// Disarm and return every dimension whose deadline is at or before `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<ControlDimension> {
        let mut due = Vec::new();
        for dimension in ControlDimension::ALL {
            let slot = &mut self.timers[dimension.index()];
            if matches!(slot, Some(deadline) if *deadline <= now) {
                *slot = None;
                due.push(dimension);
            }
        }
        due
    }

    /// Whether an intent with `attempts` retransmissions may be sent again.
    pub fn may_retry(&self, attempts: u32) -> bool {
        attempts < self.policy.max_attempts
    }
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rearming_replaces_the_timer() {
        let start = Instant::now();
        let mut scheduler = RetryScheduler::default();
        scheduler.arm(ControlDimension::Paused, start);
        scheduler.arm(ControlDimension::Paused, start + Duration::from_millis(100));
        assert_eq!(
            scheduler.deadline(ControlDimension::Paused),
            Some(start + Duration::from_millis(350))
        );
        assert!(scheduler
            .take_due(start + Duration::from_millis(250))
            .is_empty());
        assert_eq!(
            scheduler.take_due(start + Duration::from_millis(350)),
            vec![ControlDimension::Paused]
        );
        assert!(!scheduler.is_armed(ControlDimension::Paused));
    }

    #[test]
    fn next_deadline_is_the_earliest_timer() {
        let start = Instant::now();
        let mut scheduler = RetryScheduler::default();
        assert_eq!(scheduler.next_deadline(), None);
        scheduler.arm(ControlDimension::MoleculeLimit, start);
        scheduler.arm(ControlDimension::Paused, start + Duration::from_millis(50));
        assert_eq!(
            scheduler.next_deadline(),
            Some(start + Duration::from_millis(250))
        );
        assert!(scheduler.cancel(ControlDimension::MoleculeLimit));
        assert_eq!(
            scheduler.next_deadline(),
            Some(start + Duration::from_millis(300))
        );
        scheduler.cancel_all();
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn retry_budget_is_bounded() {
        let scheduler = RetryScheduler::default();
        assert!(scheduler.may_retry(0));
        assert!(scheduler.may_retry(4));
        assert!(!scheduler.may_retry(5));
    }
}
