//! Convergence verification.
//!
//! Writes to the remote service are not immediately visible to reads, so a
//! dispatch that reported success proves nothing. The verifier re-reads the
//! store with bounded exponential backoff until the observed set equals the
//! wanted set or the budget runs out.

use std::time::Duration;

use factsync_core::FactSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::{Error, RemoteError, Result};
use crate::store::RemoteFactStore;
use crate::types::Phase;

/// Delay sequence of a [`RetryPolicy`].
///
/// The nominal interval grows by the multiplier up to the cap; the
/// randomization factor spreads each returned delay around it.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_interval: Duration,
}

impl Backoff {
    /// Start a delay sequence at the policy's initial interval.
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            current: policy.initial_interval.min(policy.max_interval),
            multiplier: policy.multiplier,
            randomization_factor: policy.randomization_factor,
            max_interval: policy.max_interval,
        }
    }

    /// Return the current delay and advance to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.randomize(self.current);
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .map_or(self.max_interval, |next| next.min(self.max_interval));
        delay
    }

    fn randomize(&self, interval: Duration) -> Duration {
        if self.randomization_factor <= 0.0 {
            return interval;
        }
        let nominal = interval.as_secs_f64();
        let delta = self.randomization_factor * nominal;
        let spread = rand::random::<f64>().mul_add(2.0 * delta, nominal - delta);
        Duration::try_from_secs_f64(spread).unwrap_or(interval)
    }
}

/// Polls a store until it reports exactly the wanted facts.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyVerifier {
    policy: RetryPolicy,
}

impl ConsistencyVerifier {
    /// Create a verifier with the given retry policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Read `store` until it equals `want` as a set.
    ///
    /// Returns the confirmed observed set and the number of reads it took.
    /// A failed read counts as "not yet converged" and is retried. Each read
    /// is bounded by what is left of the budget; a read still pending when
    /// the budget runs out is recorded as a [`RemoteError::Timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConvergenceTimeout`] once the budget or attempt cap
    /// is exhausted, carrying the last observation, and
    /// [`Error::Cancelled`] as soon as `cancel` fires.
    pub async fn verify_converged(
        &self,
        store: &dyn RemoteFactStore,
        want: &FactSet,
        cancel: &CancellationToken,
    ) -> Result<(FactSet, u32)> {
        let started = Instant::now();
        let mut backoff = Backoff::new(&self.policy);
        let mut attempts: u32 = 0;
        let mut last_observed = FactSet::new();

        loop {
            attempts = attempts.saturating_add(1);

            let budget = self
                .policy
                .max_elapsed_time
                .saturating_sub(started.elapsed());
            let read = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::cancelled(Phase::Verifying)),
                read = tokio::time::timeout(budget, store.list()) => {
                    read.unwrap_or_else(|_| Err(RemoteError::timeout(budget)))
                }
            };

            let last_error = match read {
                Ok(observed) if observed.set_eq(want) => {
                    debug!(
                        scope = %store.scope(),
                        attempt = attempts,
                        "Remote state converged"
                    );
                    return Ok((observed, attempts));
                }
                Ok(observed) => {
                    debug!(
                        scope = %store.scope(),
                        attempt = attempts,
                        observed = observed.len(),
                        wanted = want.len(),
                        "Remote state not converged yet"
                    );
                    last_observed = observed;
                    None
                }
                Err(error) => {
                    warn!(
                        scope = %store.scope(),
                        attempt = attempts,
                        error = %error,
                        "Failed to read remote state"
                    );
                    Some(error)
                }
            };

            let elapsed = started.elapsed();
            let remaining = self.policy.max_elapsed_time.saturating_sub(elapsed);
            let out_of_attempts = self.policy.max_attempts.is_some_and(|max| attempts >= max);
            if remaining.is_zero() || out_of_attempts {
                let error =
                    Error::convergence_timeout(elapsed, attempts, want, last_observed, last_error);
                warn!(scope = %store.scope(), attempts, error = %error, "Convergence timed out");
                return Err(error);
            }

            let delay = backoff.next_delay().min(remaining);
            debug!(attempt = attempts, delay_ms = delay.as_millis(), "Waiting before next read");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::cancelled(Phase::Verifying)),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
