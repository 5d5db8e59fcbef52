//! Retry delay policy and deadline-aware schedules
//!
//! [`BackoffPolicy`] is a pure function of the retry number so retry counts
//! and delays can be asserted exactly. [`DeadlineSchedule`] adapts a policy
//! (or a fixed poll interval) to the `backoff` crate and stops the schedule
//! once the next wait would run past the caller's deadline.

use std::time::Duration;

use ::backoff::backoff::Backoff;
use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;

/// Exponential delay with a cap: `min(base * factor^retry, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    factor: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Self::DEFAULT_BASE,
            max: Self::DEFAULT_MAX,
            factor: Self::DEFAULT_FACTOR,
        }
    }
}

impl BackoffPolicy {
    pub const DEFAULT_BASE: Duration = Duration::from_secs(2);
    pub const DEFAULT_MAX: Duration = Duration::from_secs(60);
    pub const DEFAULT_FACTOR: u32 = 2;

    /// A factor below 1 is treated as 1 (constant delay).
    pub fn new(base: Duration, max: Duration, factor: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            factor: factor.max(1),
        }
    }

    /// Delay before retry number `retry` (0-based: the first retry waits `base`).
    pub fn next_delay(&self, retry: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(retry);
        self.base
            .checked_mul(multiplier)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

/// Serializable form of [`BackoffPolicy`] used in engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    #[serde(with = "schema_model::duration::serde_text")]
    pub base: Duration,
    #[serde(with = "schema_model::duration::serde_text")]
    pub max: Duration,
    pub factor: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: BackoffPolicy::DEFAULT_BASE,
            max: BackoffPolicy::DEFAULT_MAX,
            factor: BackoffPolicy::DEFAULT_FACTOR,
        }
    }
}

impl From<BackoffConfig> for BackoffPolicy {
    fn from(config: BackoffConfig) -> Self {
        Self::new(config.base, config.max, config.factor)
    }
}

#[derive(Debug, Clone, Copy)]
enum Delays {
    Policy(BackoffPolicy),
    Fixed(Duration),
}

/// A [`Backoff`] that yields delays until the next wait would reach the deadline.
#[derive(Debug, Clone)]
pub(crate) struct DeadlineSchedule<'a> {
    delays: Delays,
    deadline: &'a Deadline,
    retries: u32,
}

impl<'a> DeadlineSchedule<'a> {
    pub(crate) fn policy(policy: BackoffPolicy, deadline: &'a Deadline) -> Self {
        Self {
            delays: Delays::Policy(policy),
            deadline,
            retries: 0,
        }
    }

    pub(crate) fn fixed(interval: Duration, deadline: &'a Deadline) -> Self {
        Self {
            delays: Delays::Fixed(interval),
            deadline,
            retries: 0,
        }
    }
}

impl Backoff for DeadlineSchedule<'_> {
    fn reset(&mut self) {
        self.retries = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        let delay = match self.delays {
            Delays::Policy(policy) => policy.next_delay(self.retries),
            Delays::Fixed(interval) => interval,
        };
        // Nothing useful can happen after the deadline, so stop instead of sleeping into it.
        if delay >= self.deadline.remaining() {
            return None;
        }
        self.retries = self.retries.saturating_add(1);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, Duration::from_secs(2))]
    #[case(1, Duration::from_secs(4))]
    #[case(2, Duration::from_secs(8))]
    #[case(4, Duration::from_secs(32))]
    #[case(5, Duration::from_secs(60))]
    #[case(40, Duration::from_secs(60))]
    fn test_default_policy_delays(#[case] retry: u32, #[case] expected: Duration) {
        assert_eq!(BackoffPolicy::default().next_delay(retry), expected);
    }

    #[test]
    fn test_factor_one_is_constant() {
        let policy = BackoffPolicy::new(Duration::from_millis(5), Duration::from_secs(1), 0);
        assert_eq!(policy.next_delay(0), Duration::from_millis(5));
        assert_eq!(policy.next_delay(7), Duration::from_millis(5));
    }

    #[test]
    fn test_schedule_follows_policy() {
        let deadline = Deadline::after(Duration::from_secs(3600));
        let policy = BackoffPolicy::new(Duration::from_millis(10), Duration::from_secs(1), 3);
        let mut schedule = DeadlineSchedule::policy(policy, &deadline);

        let delays: Vec<Duration> = (0..3).filter_map(|_| schedule.next_backoff()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(30),
                Duration::from_millis(90)
            ]
        );

        schedule.reset();
        assert_eq!(schedule.next_backoff(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_schedule_stops_before_deadline() {
        let deadline = Deadline::after(Duration::from_millis(50));
        let mut schedule = DeadlineSchedule::fixed(Duration::from_secs(30), &deadline);
        assert_eq!(schedule.next_backoff(), None);
    }

    #[test]
    fn test_expired_deadline_stops_schedule() {
        let deadline = Deadline::after(Duration::ZERO);
        let mut schedule = DeadlineSchedule::fixed(Duration::ZERO, &deadline);
        assert_eq!(schedule.next_backoff(), None);
    }

    proptest! {
        #[test]
        fn test_delays_are_monotonic_and_capped(
            base_ms in 1u64..5_000,
            max_ms in 1u64..120_000,
            factor in 0u32..6,
            retry in 0u32..64,
        ) {
            let policy = BackoffPolicy::new(
                Duration::from_millis(base_ms),
                Duration::from_millis(max_ms),
                factor,
            );
            let now = policy.next_delay(retry);
            let next = policy.next_delay(retry + 1);
            prop_assert!(now <= next);
            prop_assert!(next <= policy.max());
            prop_assert!(now >= policy.base().min(policy.max()));
        }
    }
}
