//! Retrying request engine
//!
//! Wraps a [`Transport`] with bounded retries and pure exponential backoff
//! (1s, 2s, ...; no jitter). The payload is borrowed for the whole call so
//! every attempt sends identical content. Both suspension points, the
//! backoff sleep and the network call, race against the cancellation token.

use super::{OutgoingPayload, ServerResponse, Transport, TransportError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Retry budget: `max_retries + 1` attempts in total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before 0-indexed attempt `attempt`: 0 for the first, then
    /// `base * 2^(attempt-1)`
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt - 1))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Per-attempt timeout tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub default: Duration,
    /// Used when the payload carries an image
    pub image_upload: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30),
            image_upload: Duration::from_secs(60),
        }
    }
}

impl TimeoutPolicy {
    pub fn budget_for(&self, payload: &OutgoingPayload) -> Duration {
        if payload.has_image() {
            self.image_upload
        } else {
            self.default
        }
    }
}

/// Bookkeeping for one attempt; not persisted
#[derive(Debug, Clone, Copy)]
struct RequestAttempt {
    number: u32,
    started_at: Instant,
    timeout_budget: Duration,
}

impl RequestAttempt {
    fn start(number: u32, timeout_budget: Duration) -> Self {
        Self {
            number,
            started_at: Instant::now(),
            timeout_budget,
        }
    }
}

pub struct RequestEngine<T> {
    transport: T,
    retry: RetryPolicy,
    timeouts: TimeoutPolicy,
}

impl<T: Transport> RequestEngine<T> {
    pub fn new(transport: T, retry: RetryPolicy, timeouts: TimeoutPolicy) -> Self {
        Self {
            transport,
            retry,
            timeouts,
        }
    }

    /// One logical send. Returns the first success, the first
    /// non-retryable error, or the last error once the budget is spent.
    pub async fn send(
        &self,
        payload: &OutgoingPayload,
        cancel: &CancellationToken,
    ) -> Result<ServerResponse, TransportError> {
        let mut last_error: Option<TransportError> = None;
        let max_attempts = self.retry.max_attempts();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.retry.delay_before(attempt);
                tracing::info!(
                    delay_ms = %delay.as_millis(),
                    attempt = attempt + 1,
                    max_attempts,
                    "Retrying chat request"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(TransportError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }

            let current = RequestAttempt::start(attempt + 1, self.timeouts.budget_for(payload));
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::Cancelled),
                result = self.transport.execute(payload, current.timeout_budget) => result,
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => {
                    tracing::debug!(
                        attempt = current.number,
                        elapsed_ms = %current.started_at.elapsed().as_millis(),
                        error = %e,
                        "Retryable attempt failure"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(TransportError::unreachable))
    }
}
