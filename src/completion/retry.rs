//! Retry with exponential backoff around a `CompletionService`
//!
//! One logical completion per analysis request. Each attempt is bounded by
//! `attempt_timeout`; backoff waits double from `base_delay` up to
//! `max_delay`, carry "equal jitter" (half fixed, half random) and their sum
//! never exceeds `max_total_wait`. The backoff state is local to one call.

use super::CompletionService;
use crate::error::CompletionError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Cap on the sum of all backoff waits for one request
    pub max_total_wait: Duration,
}

impl RetryPolicy {
    /// Un-jittered delay before retry `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);

        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_total_wait: Duration::from_secs(20),
        }
    }
}

//
// ================= Time & randomness seams =================
//

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested waits and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.waits().into_iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(duration);
        }
    }
}

/// Source of the random part of a backoff delay.
pub trait Jitter: Send + Sync {
    /// A duration in `[0, upper]`.
    fn sample(&self, upper: Duration) -> Duration;
}

pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn sample(&self, upper: Duration) -> Duration {
        let upper_ms = upper.as_millis().min(u64::MAX as u128) as u64;
        Duration::from_millis(fastrand::u64(0..=upper_ms))
    }
}

/// Deterministic jitter: always the given fraction of the upper bound.
pub struct FixedJitter(pub f64);

impl Jitter for FixedJitter {
    fn sample(&self, upper: Duration) -> Duration {
        upper.mul_f64(self.0.clamp(0.0, 1.0))
    }
}

//
// ================= Client =================
//

/// Completion client with bounded retry. Cheap to share behind an `Arc`.
pub struct RetryingCompletionClient {
    service: Arc<dyn CompletionService>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn Jitter>,
}

impl RetryingCompletionClient {
    pub fn new(
        service: Arc<dyn CompletionService>,
        policy: RetryPolicy,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            service,
            policy,
            attempt_timeout,
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(RandomJitter),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn model(&self) -> &str {
        self.service.model()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay before retry `retry`, honouring a server-provided `Retry-After`.
    fn next_delay(&self, retry: u32, err: &CompletionError) -> Duration {
        let ceiling = self.policy.backoff(retry);
        let half = ceiling / 2;
        let delay = half + self.jitter.sample(ceiling - half).min(ceiling - half);

        match err {
            CompletionError::RateLimited {
                retry_after: Some(hint),
            } => delay.max(*hint).min(self.policy.max_delay),
            _ => delay,
        }
    }

    /// Run the prompt, retrying transient failures within the policy.
    pub async fn complete(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError> {
        let mut attempt: u32 = 0;
        let mut waited = Duration::ZERO;

        loop {
            attempt += 1;

            let call = tokio::time::timeout(self.attempt_timeout, self.service.complete(prompt));
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
                result = call => result.unwrap_or(Err(CompletionError::Timeout)),
            };

            let err = match outcome {
                Ok(text) => {
                    debug!(attempt, response_len = text.len(), "Completion received");
                    return Ok(text);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                warn!(attempt, error = %err, "Completion failed with non-retryable error");
                return Err(err);
            }

            if attempt >= self.policy.max_attempts {
                warn!(attempt, error = %err, "Completion retry attempts exhausted");
                return Err(err);
            }

            let remaining = self.policy.max_total_wait.saturating_sub(waited);
            if remaining.is_zero() {
                warn!(
                    attempt,
                    waited_ms = waited.as_millis() as u64,
                    error = %err,
                    "Completion backoff budget exhausted"
                );
                return Err(err);
            }

            let delay = self.next_delay(attempt, &err).min(remaining);

            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Completion attempt failed, backing off"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
                _ = self.sleeper.sleep(delay) => {}
            }

            waited += delay;
        }
    }
}
