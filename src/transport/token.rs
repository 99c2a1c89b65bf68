//! Bearer token providers

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Token unavailable: {0}")]
pub struct TokenError(pub String);

/// Supplies a bearer token for each attempt
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, TokenError>;
}

/// Fixed token from configuration
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, TokenError> {
        if self.token.trim().is_empty() {
            return Err(TokenError("empty token configured".to_string()));
        }
        Ok(self.token.clone())
    }
}
