// src/retry.rs
//! Exponential backoff executor, parameterized per wrapped service.
//!
//! Delay between attempt `i` and `i + 1` is `initial_delay * multiplier^(i-1)`,
//! optionally capped and jittered. Waits are `tokio::time::sleep`, so a retrying
//! call only suspends its own task and is cancelled by dropping its future.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ErrorKind, ServiceError};

fn default_jitter() -> f64 {
    0.1
}

/// Serializable retry settings (one `[retry.<service>]` table in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySpec {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Upper bound for a single wait. `None` = uncapped.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
    /// Relative jitter in `[0, 1]`; 0.1 means ±10%.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl RetrySpec {
    pub fn new(max_attempts: u32, initial_delay_ms: u64, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            backoff_multiplier,
            max_delay_ms: None,
            jitter: default_jitter(),
        }
    }

    pub fn with_max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = Some(ms);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Build the runtime policy for `service`.
    pub fn policy(&self, service: &'static str) -> RetryPolicy {
        RetryPolicy {
            service,
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            multiplier: self.backoff_multiplier.max(1.0),
            max_delay: self.max_delay_ms.map(Duration::from_millis),
            jitter: self.jitter.clamp(0.0, 1.0),
        }
    }
}

/// Returned when the policy gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError {
    /// Error of the final attempt.
    pub last: ServiceError,
    pub attempts: u32,
    /// `true` only when every allowed attempt was spent on transient errors.
    pub exhausted: bool,
}

impl RetryError {
    pub fn kind(&self) -> ErrorKind {
        self.last.kind
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    service: &'static str,
    max_attempts: u32,
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Option<Duration>,
    jitter: f64,
}

impl RetryPolicy {
    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Un-jittered wait after failed attempt `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
        let d = Duration::from_secs_f64(secs.min(u32::MAX as f64));
        match self.max_delay {
            Some(cap) => d.min(cap),
            None => d,
        }
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let factor = 1.0 + rand::rng().random_range(-self.jitter..=self.jitter);
        base.mul_f64(factor.max(0.0))
    }

    /// Run `op` until it succeeds, hits a non-transient error, or runs out of
    /// attempts. `op` receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            counter!("retry_attempts_total", "service" => self.service).increment(1);

            let err = match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };

            if !err.kind.is_transient() {
                warn!(
                    target: "retry",
                    service = self.service,
                    attempt,
                    kind = %err.kind,
                    error = %err.message,
                    "non-retryable error"
                );
                return Err(RetryError {
                    last: err,
                    attempts: attempt,
                    exhausted: false,
                });
            }

            if attempt >= self.max_attempts {
                counter!("retry_exhausted_total", "service" => self.service).increment(1);
                warn!(
                    target: "retry",
                    service = self.service,
                    attempts = attempt,
                    kind = %err.kind,
                    error = %err.message,
                    "retries exhausted"
                );
                return Err(RetryError {
                    last: err,
                    attempts: attempt,
                    exhausted: true,
                });
            }

            let wait = self.jittered(self.base_delay(attempt));
            debug!(
                target: "retry",
                service = self.service,
                attempt,
                max = self.max_attempts,
                wait_ms = wait.as_millis() as u64,
                kind = %err.kind,
                "transient error, backing off"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_delay_follows_exponential_schedule() {
        let p = RetrySpec::new(5, 100, 2.0).with_jitter(0.0).policy("t");
        assert_eq!(p.base_delay(1), Duration::from_millis(100));
        assert_eq!(p.base_delay(2), Duration::from_millis(200));
        assert_eq!(p.base_delay(3), Duration::from_millis(400));
        assert_eq!(p.base_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn base_delay_respects_cap() {
        let p = RetrySpec::new(5, 2_000, 2.0)
            .with_max_delay_ms(5_000)
            .policy("t");
        assert_eq!(p.base_delay(1), Duration::from_secs(2));
        assert_eq!(p.base_delay(2), Duration::from_secs(4));
        assert_eq!(p.base_delay(3), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_band() {
        let p = RetrySpec::new(3, 1_000, 2.0).with_jitter(0.25).policy("t");
        for _ in 0..200 {
            let d = p.jittered(Duration::from_millis(1_000));
            assert!(d >= Duration::from_millis(750) && d <= Duration::from_millis(1_250));
        }
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let p = RetrySpec::new(0, 10, 0.5).policy("t");
        assert_eq!(p.max_attempts(), 1);
        assert_eq!(p.base_delay(2), Duration::from_millis(10));
    }
}
