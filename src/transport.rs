//! Chat backend transport
//!
//! One HTTP attempt per `Transport::execute` call; retry policy lives in
//! [`RequestEngine`].

mod engine;
mod error;
mod http;
mod token;
mod types;

#[cfg(test)]
pub mod testing;

pub use engine::{RequestEngine, RetryPolicy, TimeoutPolicy};
pub use error::TransportError;
pub use http::HttpTransport;
pub use token::{StaticTokenProvider, TokenProvider};
pub use types::{ImageAttachment, OutgoingPayload, ResponseBody, ServerResponse};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A single round trip to the chat endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform exactly one attempt, bounded by `timeout`
    async fn execute(
        &self,
        payload: &OutgoingPayload,
        timeout: Duration,
    ) -> Result<ServerResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn execute(
        &self,
        payload: &OutgoingPayload,
        timeout: Duration,
    ) -> Result<ServerResponse, TransportError> {
        (**self).execute(payload, timeout).await
    }
}

/// Logging wrapper for transports
pub struct LoggingTransport<T> {
    inner: T,
}

impl<T: Transport> LoggingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: Transport> Transport for LoggingTransport<T> {
    async fn execute(
        &self,
        payload: &OutgoingPayload,
        timeout: Duration,
    ) -> Result<ServerResponse, TransportError> {
        let start = std::time::Instant::now();
        let result = self.inner.execute(payload, timeout).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    mode = %payload.mode,
                    duration_ms = %duration.as_millis(),
                    response_bytes = response.response.len(),
                    has_session = response.session_id.is_some(),
                    "Chat request completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    mode = %payload.mode,
                    duration_ms = %duration.as_millis(),
                    timeout_secs = timeout.as_secs(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "Chat request failed"
                );
            }
        }

        result
    }
}
