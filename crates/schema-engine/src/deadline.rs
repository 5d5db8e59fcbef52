//! Absolute time budgets for invoke, poll and apply operations

use std::time::{Duration, Instant};

use crate::Error;

const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// The point in time by which an operation must complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        let started = Instant::now();
        let at = started
            .checked_add(budget)
            .or_else(|| started.checked_add(FAR_FUTURE))
            .unwrap_or(started);
        Self { started, at }
    }

    /// The earlier of `self` and a deadline `budget` from now.
    pub fn capped(&self, budget: Duration) -> Self {
        let other = Self::after(budget);
        Self {
            started: other.started,
            at: self.at.min(other.at),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The error to report when this deadline cuts `operation` short.
    pub fn exceeded(&self, operation: impl Into<String>, last_error: Option<String>) -> Error {
        Error::DeadlineExceeded {
            operation: operation.into(),
            elapsed: self.elapsed(),
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_is_expired() {
        assert!(Deadline::after(Duration::ZERO).is_expired());
    }

    #[test]
    fn test_remaining_is_bounded_by_budget() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() <= Duration::from_secs(60));
    }

    #[test]
    fn test_capped_takes_earlier_deadline() {
        let outer = Deadline::after(Duration::from_secs(10));
        assert!(outer.capped(Duration::from_secs(3600)).remaining() <= Duration::from_secs(10));
        assert!(outer.capped(Duration::from_secs(1)).remaining() <= Duration::from_secs(1));
    }

    #[test]
    fn test_huge_budget_does_not_overflow() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(!deadline.is_expired());
    }

    #[test]
    fn test_exceeded_error() {
        let err = Deadline::after(Duration::ZERO).exceeded("poll", None);
        assert!(matches!(err, Error::DeadlineExceeded { ref operation, .. } if operation == "poll"));
    }
}
