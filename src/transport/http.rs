//! reqwest-backed chat transport

use super::{
    OutgoingPayload, ResponseBody, ServerResponse, TokenProvider, Transport, TransportError,
};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of the startup health probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    /// Server answered but reported a problem
    Degraded(String),
    Unreachable(String),
}

impl HealthStatus {
    /// One-time advisory text for the user, if any
    pub fn advisory(&self) -> Option<String> {
        match self {
            HealthStatus::Ok => None,
            HealthStatus::Degraded(detail) => Some(format!(
                "The tutoring service is not fully configured ({detail}). Answers may fail until it is fixed."
            )),
            HealthStatus::Unreachable(_) => {
                Some("Cannot connect to the tutoring server.".to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: Option<String>,
    message: Option<String>,
}

/// HTTP transport for the chat endpoint
pub struct HttpTransport {
    client: Client,
    chat_url: String,
    health_url: String,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl HttpTransport {
    pub fn new(
        chat_url: impl Into<String>,
        health_url: impl Into<String>,
        tokens: Option<Arc<dyn TokenProvider>>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            chat_url: chat_url.into(),
            health_url: health_url.into(),
            tokens,
        })
    }

    /// Probe the health endpoint once
    pub async fn check_health(&self) -> HealthStatus {
        let response = match self
            .client
            .get(&self.health_url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(url = %self.health_url, error = %e, "Health probe failed");
                return HealthStatus::Unreachable(e.to_string());
            }
        };

        let status = response.status();
        match response.json::<HealthBody>().await {
            Ok(body) if body.status.as_deref() == Some("ok") => HealthStatus::Ok,
            Ok(body) => HealthStatus::Degraded(
                body.message
                    .or(body.status)
                    .unwrap_or_else(|| format!("status {}", status.as_u16())),
            ),
            Err(e) => HealthStatus::Degraded(format!("unreadable health response: {e}")),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        payload: &OutgoingPayload,
        timeout: Duration,
    ) -> Result<ServerResponse, TransportError> {
        let mut request = self
            .client
            .post(&self.chat_url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout);

        if let Some(tokens) = &self.tokens {
            let token = tokens.token().await.map_err(|e| {
                tracing::warn!(error = %e, "Bearer token unavailable");
                TransportError::Unauthorized
            })?;
            request = request.bearer_auth(token);
        }

        let body = serde_json::to_vec(payload)
            .map_err(|e| TransportError::EncodingFailed(e.to_string()))?;

        tracing::debug!(
            payload_bytes = body.len(),
            timeout_secs = timeout.as_secs(),
            has_image = payload.has_image(),
            "Sending chat request"
        );

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_request_error(&e))?;

        decode_response(status, &bytes)
    }
}

fn decode_response(status: StatusCode, bytes: &[u8]) -> Result<ServerResponse, TransportError> {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(TransportError::Unauthorized);
    }

    if !status.is_success() {
        let message = serde_json::from_slice::<ResponseBody>(bytes)
            .ok()
            .and_then(|b| b.error);
        return Err(TransportError::server_error(status.as_u16(), message));
    }

    let body: ResponseBody = serde_json::from_slice(bytes)
        .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

    if let Some(error) = body.error.filter(|e| !e.trim().is_empty()) {
        return Err(TransportError::server_error(status.as_u16(), Some(error)));
    }

    let response = body
        .response
        .ok_or_else(|| TransportError::InvalidResponse("missing `response` field".to_string()))?;

    Ok(ServerResponse {
        response,
        session_id: body.session_id,
    })
}

fn classify_request_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::unreachable()
    } else if err.is_builder() {
        TransportError::EncodingFailed(err.to_string())
    } else if err.is_decode() {
        TransportError::InvalidResponse(err.to_string())
    } else {
        // Request or body failed after the connection was established
        TransportError::connection_lost()
    }
}
