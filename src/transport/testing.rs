//! Mock transport for testing
//!
//! Returns queued outcomes and records every request body.

use super::{OutgoingPayload, ServerResponse, Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// One queued outcome, optionally delayed
struct MockOutcome {
    delay: Duration,
    result: Result<ServerResponse, TransportError>,
}

/// Request observed by the mock
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Serialized JSON body exactly as it would go on the wire
    pub body: Vec<u8>,
    pub timeout: Duration,
    pub at: Instant,
}

impl RecordedCall {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub struct MockTransport {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    calls: Mutex<Vec<RecordedCall>>,
    /// Notified when a request starts (for test synchronization)
    pub request_started: Arc<Notify>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_response(&self, response: ServerResponse) {
        self.queue_delayed(Duration::ZERO, Ok(response));
    }

    pub fn queue_error(&self, error: TransportError) {
        self.queue_delayed(Duration::ZERO, Err(error));
    }

    pub fn queue_delayed(&self, delay: Duration, result: Result<ServerResponse, TransportError>) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(MockOutcome { delay, result });
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        payload: &OutgoingPayload,
        timeout: Duration,
    ) -> Result<ServerResponse, TransportError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| TransportError::EncodingFailed(e.to_string()))?;
        self.calls.lock().unwrap().push(RecordedCall {
            body,
            timeout,
            at: Instant::now(),
        });

        let outcome = self.outcomes.lock().unwrap().pop_front();
        self.request_started.notify_one();

        let Some(outcome) = outcome else {
            return Err(TransportError::InvalidResponse(
                "No mock response queued".to_string(),
            ));
        };
        if !outcome.delay.is_zero() {
            tokio::time::sleep(outcome.delay).await;
        }
        outcome.result
    }
}
