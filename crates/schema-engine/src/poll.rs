//! Blocking poll loop over a read endpoint

use std::time::Duration;

use tracing::debug;

use crate::deadline::Deadline;
use crate::retry::DeadlineSchedule;
use crate::{Error, Result};

/// The value that satisfied the predicate and how many reads it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Polled<T> {
    pub value: T,
    pub polls: u32,
}

enum Miss {
    /// The read worked but the predicate does not hold yet
    Pending,
    /// The read failed in a way that may clear up
    Transient(Error),
    /// The read failed for good, or the deadline already passed
    Fatal(Error),
}

/// Repeats a read until a predicate over its result holds.
///
/// Reads never overlap: each read completes before the interval sleep
/// starts. Every read is bounded by the time left on the deadline, and the
/// loop stops as soon as another read could not start before the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

impl Poller {
    /// Keeps request volume low while a reload that takes minutes is
    /// still noticed promptly.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll `read` until `predicate` holds.
    ///
    /// `read` receives the time left on the deadline to use as its own call
    /// timeout. Transient read failures (see [`Error::is_transient`]) are
    /// polled through; any other failure ends the loop with that error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeadlineExceeded`] if the deadline passes before the
    /// predicate holds, carrying the last transient failure if there was one.
    pub fn poll_until<T, R, P>(
        &self,
        operation: &str,
        deadline: &Deadline,
        mut read: R,
        predicate: P,
    ) -> Result<Polled<T>>
    where
        R: FnMut(Duration) -> Result<T>,
        P: Fn(&T) -> bool,
    {
        let mut polls: u32 = 0;
        let mut last_error: Option<String> = None;

        let attempt = || {
            if deadline.is_expired() {
                return Err(::backoff::Error::permanent(Miss::Fatal(
                    deadline.exceeded(operation, None),
                )));
            }
            polls += 1;
            match read(deadline.remaining()) {
                Ok(value) if predicate(&value) => Ok(value),
                Ok(_) => Err(::backoff::Error::transient(Miss::Pending)),
                Err(err) if err.is_transient() => Err(::backoff::Error::transient(Miss::Transient(err))),
                Err(err) => Err(::backoff::Error::permanent(Miss::Fatal(err))),
            }
        };

        let notify = |miss: Miss, wait: Duration| {
            match miss {
                Miss::Pending => {
                    debug!(operation, wait_ms = wait.as_millis() as u64, "Not ready yet, polling again");
                }
                Miss::Transient(err) | Miss::Fatal(err) => {
                    debug!(operation, wait_ms = wait.as_millis() as u64, error = %err, "Read failed, polling again");
                    last_error = Some(err.to_string());
                }
            }
        };

        let result = ::backoff::retry_notify(
            DeadlineSchedule::fixed(self.interval, deadline),
            attempt,
            notify,
        );

        match result {
            Ok(value) => Ok(Polled { value, polls }),
            Err(::backoff::Error::Permanent(Miss::Fatal(err))) => match err {
                Error::DeadlineExceeded { .. } => Err(deadline.exceeded(operation, last_error)),
                other => Err(other),
            },
            Err(::backoff::Error::Transient { err: Miss::Transient(err), .. }) => {
                Err(deadline.exceeded(operation, Some(err.to_string())))
            }
            Err(::backoff::Error::Permanent(_) | ::backoff::Error::Transient { .. }) => {
                Err(deadline.exceeded(operation, last_error))
            }
        }
    }
}
