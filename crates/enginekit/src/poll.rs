//! Bounded polling with exponential backoff.
//!
//! Used to wait for a freshly started container to become ready without a
//! fixed sleep: the check is repeated with growing intervals until it
//! reports ready, aborts, or the deadline passes.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Timing for [`poll_until`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Give up after this much time
    pub timeout: Duration,
    /// Delay after the first pending attempt
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after each attempt
    pub backoff_factor: f64,
    /// Upper bound for a single delay
    pub max_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            initial_interval: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(5),
        }
    }
}

impl PollConfig {
    /// Calculate the delay after a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay =
            self.initial_interval.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// Result of a single check.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// Condition met
    Ready(T),
    /// Not yet; the reason is kept for the timeout report
    Pending(String),
    /// Give up immediately
    Abort(E),
}

/// Why polling stopped without success.
#[derive(Debug)]
pub enum PollError<E> {
    /// A check returned [`Attempt::Abort`]
    Aborted(E),
    /// The deadline passed while checks were still pending
    TimedOut {
        /// Time spent polling
        elapsed: Duration,
        /// Number of checks made
        attempts: u32,
        /// Reason reported by the final check
        last: String,
    },
}

impl<E: fmt::Display> fmt::Display for PollError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::Aborted(e) => write!(f, "{e}"),
            PollError::TimedOut {
                elapsed,
                attempts,
                last,
            } => write!(
                f,
                "timed out after {:.1}s ({attempts} attempts): {last}",
                elapsed.as_secs_f64()
            ),
        }
    }
}

/// Callback trait for poll progress notifications.
pub trait PollCallback {
    /// Called after a pending check, before sleeping.
    fn on_pending(&self, attempt: u32, reason: &str, delay: Duration);
}

/// Callback that logs pending checks at debug level.
pub struct LogCallback;

impl PollCallback for LogCallback {
    fn on_pending(&self, attempt: u32, reason: &str, delay: Duration) {
        log::debug!(
            "attempt {attempt} not ready ({reason}), next check in {}ms",
            delay.as_millis()
        );
    }
}

/// Repeat `check` until it is ready, aborts, or `config.timeout` elapses.
///
/// `check` receives the 1-indexed attempt number and always runs at least
/// once, even with a zero timeout. Delays never overshoot the deadline.
pub fn poll_until<T, E, F>(
    config: &PollConfig,
    callback: Option<&dyn PollCallback>,
    mut check: F,
) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Attempt<T, E>,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let reason = match check(attempt) {
            Attempt::Ready(value) => return Ok(value),
            Attempt::Abort(e) => return Err(PollError::Aborted(e)),
            Attempt::Pending(reason) => reason,
        };

        let elapsed = start.elapsed();
        if elapsed >= config.timeout {
            return Err(PollError::TimedOut {
                elapsed,
                attempts: attempt,
                last: reason,
            });
        }

        let delay = config
            .delay_for_attempt(attempt - 1)
            .min(config.timeout - elapsed);

        if let Some(cb) = callback {
            cb.on_pending(attempt, &reason, delay);
        }

        thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast() -> PollConfig {
        PollConfig {
            timeout: Duration::from_millis(200),
            initial_interval: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_delay_backoff() {
        let config = PollConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_ready_first_try() {
        let result: Result<u16, PollError<String>> =
            poll_until(&fast(), None, |_| Attempt::Ready(200));
        assert_eq!(result.unwrap(), 200);
    }

    #[test]
    fn test_ready_after_pending() {
        let result: Result<u32, PollError<String>> = poll_until(&fast(), None, |n| {
            if n < 3 {
                Attempt::Pending(format!("attempt {n}"))
            } else {
                Attempt::Ready(n)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_abort_stops_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), PollError<&str>> = poll_until(&fast(), None, |_| {
            calls.set(calls.get() + 1);
            Attempt::Abort("exited")
        });
        assert!(matches!(result, Err(PollError::Aborted("exited"))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_times_out_with_last_reason() {
        let config = PollConfig {
            timeout: Duration::from_millis(20),
            ..fast()
        };
        let result: Result<(), PollError<String>> =
            poll_until(&config, None, |n| Attempt::Pending(format!("refused {n}")));
        match result {
            Err(PollError::TimedOut { attempts, last, .. }) => {
                assert!(attempts >= 2);
                assert_eq!(last, format!("refused {attempts}"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_timeout_checks_once() {
        let config = PollConfig {
            timeout: Duration::ZERO,
            ..fast()
        };
        let calls = Cell::new(0);
        let result: Result<(), PollError<String>> = poll_until(&config, None, |_| {
            calls.set(calls.get() + 1);
            Attempt::Pending("not yet".to_string())
        });
        assert!(matches!(result, Err(PollError::TimedOut { attempts: 1, .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_callback_invoked_per_pending() {
        struct Counting(Cell<u32>);
        impl PollCallback for Counting {
            fn on_pending(&self, _: u32, _: &str, _: Duration) {
                self.0.set(self.0.get() + 1);
            }
        }

        let counter = Counting(Cell::new(0));
        let _: Result<u32, PollError<String>> = poll_until(&fast(), Some(&counter), |n| {
            if n < 4 {
                Attempt::Pending(String::new())
            } else {
                Attempt::Ready(n)
            }
        });
        assert_eq!(counter.0.get(), 3);
    }
}
