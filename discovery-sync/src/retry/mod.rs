//! Retry with exponential backoff.
//!
//! The engine is invoked after an operation has already failed once with a
//! retryable error. Each further attempt `n` (0-indexed) is preceded by a
//! wait of
//!
//! ```text
//! delay(n) = min(base_delay * backoff_factor^n * jitter, max_delay)
//! ```
//!
//! with `jitter` drawn uniformly from `[0.8, 1.2]`. Waits are cancellable and
//! only suspend the calling task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use discovery_sync_shared::OperationKind;
use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::SyncError;
use crate::metrics::SyncMetrics;

const JITTER_MIN: f64 = 0.8;
const JITTER_MAX: f64 = 1.2;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts the engine makes after the initial failure.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(3600),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` for a given jitter factor.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let nominal = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent) * jitter;
        let capped = nominal.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Delay before attempt `attempt` with random jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        self.delay_with_jitter(attempt, jitter)
    }
}

/// One failed attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub error: String,
    pub timestamp: DateTime<Utc>,
    pub next_retry: Option<DateTime<Utc>>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryStatus {
    InProgress,
    Success,
    Failed,
    Cancelled,
}

/// Attempt log of one operation. Kept in memory and logged when the
/// engine finishes.
#[derive(Debug, Clone, Serialize)]
pub struct RetryHistory {
    pub operation_id: String,
    pub entity: String,
    pub operation: OperationKind,
    pub attempts: Vec<RetryAttempt>,
    pub status: RetryStatus,
}

impl RetryHistory {
    pub fn new(
        operation_id: impl Into<String>,
        entity: impl Into<String>,
        operation: OperationKind,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            entity: entity.into(),
            operation,
            attempts: Vec::new(),
            status: RetryStatus::InProgress,
        }
    }

    fn log_outcome(&self) {
        let summary = serde_json::to_string(&self.attempts).unwrap_or_default();
        match self.status {
            RetryStatus::Success => info!(
                operation_id = %self.operation_id,
                entity = %self.entity,
                operation = %self.operation,
                failed_attempts = self.attempts.len(),
                "Operation succeeded after retry"
            ),
            _ => warn!(
                operation_id = %self.operation_id,
                entity = %self.entity,
                operation = %self.operation,
                status = ?self.status,
                attempts = %summary,
                "Retry finished without success"
            ),
        }
    }
}

/// Runs retryable operations with backoff.
#[derive(Debug, Clone)]
pub struct RetryEngine {
    policy: RetryPolicy,
    metrics: Arc<SyncMetrics>,
}

impl RetryEngine {
    pub fn new(policy: RetryPolicy, metrics: Arc<SyncMetrics>) -> Self {
        Self { policy, metrics }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Retry `operation` after it failed with `initial_error`.
    ///
    /// Makes at most `max_attempts` further calls. Stops early when an
    /// attempt succeeds, fails with a non-retryable error, or `cancel`
    /// fires. No attempt starts once cancellation has been observed.
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - An attempt succeeded
    /// * `Err(SyncError::RetryExhausted)` - Every attempt failed; carries the
    ///   total number of attempts including the initial one and the last error
    /// * `Err(SyncError::Cancelled)` - Cancelled while waiting or attempting
    /// * `Err(e)` - An attempt failed with non-retryable `e`
    pub async fn run<T, F, Fut>(
        &self,
        history: &mut RetryHistory,
        initial_error: SyncError,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let first_delay = self.policy.delay(0);
        self.run_after(history, initial_error, first_delay, cancel, operation)
            .await
    }

    /// Like [`RetryEngine::run`], but waits exactly `first_delay` before the
    /// first attempt. Callers that already announced when the next attempt
    /// happens pass the delay they announced.
    pub async fn run_after<T, F, Fut>(
        &self,
        history: &mut RetryHistory,
        initial_error: SyncError,
        first_delay: Duration,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut last_error = initial_error;
        let mut next_delay = first_delay;

        for attempt in 0..self.policy.max_attempts {
            debug!(
                operation_id = %history.operation_id,
                attempt = attempt + 1,
                delay_ms = next_delay.as_millis() as u64,
                "Waiting before retry"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    history.status = RetryStatus::Cancelled;
                    history.log_outcome();
                    return Err(SyncError::Cancelled);
                }
                _ = tokio::time::sleep(next_delay) => {}
            }

            self.metrics.record_retry_attempt();
            let started = Instant::now();
            let result = operation().await;
            let elapsed = started.elapsed();

            match result {
                Ok(value) => {
                    history.status = RetryStatus::Success;
                    history.log_outcome();
                    return Ok(value);
                }
                Err(SyncError::Cancelled) => {
                    history.status = RetryStatus::Cancelled;
                    history.log_outcome();
                    return Err(SyncError::Cancelled);
                }
                Err(err) => {
                    let now = Utc::now();
                    let more_attempts = attempt + 1 < self.policy.max_attempts;
                    next_delay = self.policy.delay(attempt + 1);
                    history.attempts.push(RetryAttempt {
                        attempt: attempt + 1,
                        error: err.to_string(),
                        timestamp: now,
                        next_retry: more_attempts
                            .then(|| chrono::Duration::from_std(next_delay).ok())
                            .flatten()
                            .and_then(|d| now.checked_add_signed(d)),
                        duration: elapsed,
                    });

                    warn!(
                        operation_id = %history.operation_id,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        error = %err,
                        "Retry attempt failed"
                    );

                    if !err.is_retryable() {
                        history.status = RetryStatus::Failed;
                        history.log_outcome();
                        return Err(err);
                    }
                    last_error = err;
                }
            }
        }

        history.status = RetryStatus::Failed;
        history.log_outcome();
        self.metrics.record_retry_exhausted();
        Err(SyncError::retry_exhausted(
            self.policy.max_attempts + 1,
            last_error,
        ))
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}
