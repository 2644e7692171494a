//! Retry policy for transactional callbacks.
//!
//! Every transport error and every response other than `200 OK` is retried.
//! Waits grow exponentially from [`RetryPolicy::initial_delay`] by
//! [`RetryPolicy::multiplier`] up to [`RetryPolicy::max_delay`]. There is no
//! attempt ceiling: the loop ends on acknowledgement or when the cycle stops,
//! and a stop interrupts a wait immediately.

use std::future::Future;
use std::time::Duration;

use hub::{CallbackError, CallbackResponse};
use tracing::{info, warn};

use crate::CycleSignal;

/// Backoff schedule and success predicate for callback delivery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
    /// Growth factor between consecutive waits; values below 1 are treated as 1.
    pub multiplier: f64,
    /// Upper bound on any single wait.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// 1 s, doubling, capped at one minute.
    pub const DEFAULT: Self = Self {
        initial_delay: Duration::from_secs(1),
        multiplier: 2.0,
        max_delay: Duration::from_secs(60),
    };

    /// Creates a policy.
    pub fn new(initial_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            multiplier,
            max_delay,
        }
    }

    /// Returns the wait after failed attempt number `failure` (0-indexed).
    pub fn delay_for_attempt(&self, failure: u32) -> Duration {
        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else {
            1.0
        };
        let exponent = i32::try_from(failure.min(64)).unwrap_or(64);
        let secs = self.initial_delay.as_secs_f64() * multiplier.powi(exponent);
        if secs.is_finite() {
            Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
        } else {
            self.max_delay
        }
    }

    /// Returns the (endless) sequence of waits.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..).map(|failure| self.delay_for_attempt(failure))
    }

    /// The success predicate: a `200 OK` response.
    pub fn is_acknowledged(outcome: &Result<CallbackResponse, CallbackError>) -> bool {
        matches!(outcome, Ok(response) if response.is_acknowledged())
    }

    /// Calls `attempt` until it is acknowledged or `signal` stops the cycle.
    ///
    /// `attempt` receives the 1-based attempt number.
    pub async fn run<F, Fut>(&self, signal: &CycleSignal, mut attempt: F) -> RetryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<CallbackResponse, CallbackError>>,
    {
        let mut waited = Vec::new();
        let mut attempts = 0u32;
        loop {
            if !signal.is_live() {
                return RetryOutcome::Interrupted { attempts, waited };
            }
            attempts += 1;
            let outcome = tokio::select! {
                biased;
                () = signal.stopped() => return RetryOutcome::Interrupted { attempts, waited },
                outcome = attempt(attempts) => outcome,
            };
            if Self::is_acknowledged(&outcome) {
                return RetryOutcome::Acknowledged { attempts, waited };
            }

            let delay = self.delay_for_attempt(attempts - 1);
            match &outcome {
                Ok(response) => info!(
                    attempt = attempts,
                    status = response.status,
                    delay_ms = delay.as_millis() as u64,
                    "callback not acknowledged, backing off"
                ),
                Err(error) => warn!(
                    attempt = attempts,
                    %error,
                    delay_ms = delay.as_millis() as u64,
                    "callback failed, backing off"
                ),
            }

            tokio::select! {
                biased;
                () = signal.stopped() => return RetryOutcome::Interrupted { attempts, waited },
                () = tokio::time::sleep(delay) => waited.push(delay),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// How a retried delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The callback answered `200 OK`.
    Acknowledged {
        /// Attempts made, including the successful one.
        attempts: u32,
        /// Backoff waits completed before success.
        waited: Vec<Duration>,
    },
    /// The cycle stopped first; the delivery must not be recorded.
    Interrupted {
        /// Attempts started.
        attempts: u32,
        /// Backoff waits completed before the stop.
        waited: Vec<Duration>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::StopReason;

    fn status(code: u16) -> Result<CallbackResponse, CallbackError> {
        Ok(CallbackResponse { status: code })
    }

    #[test]
    fn delays_double_and_cap() {
        let delays: Vec<u64> = RetryPolicy::DEFAULT
            .delays()
            .take(9)
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, [1, 2, 4, 8, 16, 32, 60, 60, 60]);
    }

    #[test]
    fn delays_are_non_decreasing_and_bounded() {
        let policy = RetryPolicy::new(Duration::from_millis(250), 3.0, Duration::from_secs(45));
        let delays: Vec<_> = policy.delays().take(200).collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(45)));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn only_200_is_acknowledged() {
        assert!(RetryPolicy::is_acknowledged(&status(200)));
        assert!(!RetryPolicy::is_acknowledged(&status(201)));
        assert!(!RetryPolicy::is_acknowledged(&status(503)));
        assert!(!RetryPolicy::is_acknowledged(&Err(CallbackError::Transport {
            url: "http://x".into(),
            message: "refused".into(),
        })));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_acknowledged() {
        let calls = Arc::new(AtomicU32::new(0));
        let signal = CycleSignal::new();
        let started = tokio::time::Instant::now();
        let outcome = RetryPolicy::DEFAULT
            .run(&signal, |_| {
                let calls = calls.clone();
                async move {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 | 1 => status(503),
                        _ => status(200),
                    }
                }
            })
            .await;
        assert_eq!(
            outcome,
            RetryOutcome::Acknowledged {
                attempts: 3,
                waited: vec![Duration::from_secs(1), Duration::from_secs(2)],
            }
        );
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_a_backoff_wait() {
        let signal = CycleSignal::new();
        let stopper = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3_500)).await;
            stopper.stop(StopReason::LostLeadership);
        });
        let started = tokio::time::Instant::now();
        let outcome = RetryPolicy::DEFAULT.run(&signal, |_| async { status(500) }).await;
        // Attempts at 0s, 1s, 3s; the 4s wait after the third is cut short.
        assert_eq!(
            outcome,
            RetryOutcome::Interrupted {
                attempts: 3,
                waited: vec![Duration::from_secs(1), Duration::from_secs(2)],
            }
        );
        assert_eq!(started.elapsed(), Duration::from_millis(3_500));
    }
}
