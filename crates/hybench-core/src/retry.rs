//! Bounded retry with exponential backoff and jitter.
//!
//! One [`RetryPolicy`] is built from config and injected into every external
//! call wrapper. [`call_with_retry`] runs an operation under the policy:
//!
//! ```text
//! attempt 1 ─ call ─ cooldown ─ ok? ─ return
//!                              └ err ─ retryable? ─ no ─ Permanent
//!                                      └ yes ─ attempts left? ─ no ─ Exhausted
//!                                              └ yes ─ backoff(attempt) + jitter ─ attempt 2 ...
//! ```
//!
//! The cooldown after each call is mandatory, success or failure. Backoff
//! grows as `base * multiplier^(attempt-1)` and is capped at `max_delay_ms`.
//! A server `Retry-After` hint raises the wait, never lowers it.

use crate::rate_limit::Pacer;
use crate::timing;
use crate::upstream::{Service, ServiceError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry settings, `[retry]` in config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first call. Minimum 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound of the uniform jitter added to each backoff.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    4
}

const fn default_base_delay_ms() -> u64 {
    1_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

const fn default_jitter_ms() -> u64 {
    500
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Effective attempt budget (never below 1).
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Backoff before retry number `failed_attempts + 1`, without jitter.
    ///
    /// `failed_attempts` is 1 after the first failure.
    #[must_use]
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(32);
        let factor = self.multiplier.max(1.0).powi(i32::try_from(exponent).unwrap_or(32));
        #[allow(clippy::cast_precision_loss)]
        let raw_ms = (self.base_delay_ms as f64) * factor;
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let capped = raw_ms.min(self.max_delay_ms as f64).max(0.0) as u64;
        Duration::from_millis(capped)
    }
}

/// Why a retried call gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    /// Every attempt failed with a retryable error.
    #[error("{service} failed after {attempts} attempts: {last}")]
    Exhausted {
        service: Service,
        attempts: u32,
        last: ServiceError,
    },

    /// The service rejected the request; retrying cannot help.
    #[error("{0}")]
    Permanent(ServiceError),

    /// The run was interrupted before the call completed.
    #[error("{0} call cancelled")]
    Cancelled(Service),
}

/// Run `op` under `policy`, pacing every attempt through `pacer`.
///
/// Each attempt is timed under the service's operation name.
///
/// # Errors
///
/// See [`RetryError`].
pub fn call_with_retry<T>(
    policy: &RetryPolicy,
    pacer: &mut Pacer,
    service: Service,
    mut op: impl FnMut() -> Result<T, ServiceError>,
) -> Result<T, RetryError> {
    let attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        if pacer.cancel_token().is_cancelled() {
            return Err(RetryError::Cancelled(service));
        }
        attempt += 1;

        let result = timing::timed(service.op_name(), &mut op);
        pacer.cooldown();

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!(%service, attempt, "call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            warn!(%service, error = %err, "permanent upstream failure, not retrying");
            return Err(RetryError::Permanent(err));
        }

        if attempt >= attempts {
            warn!(%service, attempts, error = %err, "retries exhausted");
            return Err(RetryError::Exhausted {
                service,
                attempts,
                last: err,
            });
        }

        let mut wait = policy.backoff(attempt) + pacer.jitter(policy.jitter_ms);
        if let Some(hint) = err.retry_after() {
            wait = wait.max(hint);
        }
        warn!(
            %service,
            attempt,
            max_attempts = attempts,
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "transient upstream failure, backing off"
        );
        pacer.pause(wait);
    }
}
