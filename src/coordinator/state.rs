//! Coordinator state types

use crate::conversation::{
    ConversationMode, LearnerProgress, Message, ModeState, Preferences, Topic, TranscriptError,
};
use crate::transport::{OutgoingPayload, TransportError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Sending {
        request_id: u64,
    },
    /// The learner cancelled; accepts new sends like `Idle`
    Cancelled,
}

impl Phase {
    pub fn is_sending(self) -> bool {
        matches!(self, Phase::Sending { .. })
    }
}

/// Error shown inline in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFacingError {
    pub message: String,
    pub suggestion: Option<String>,
    /// The failed content can be resubmitted as-is
    pub retryable: bool,
}

const CHECK_CONNECTION: &str = "Check your connection and try again.";
const SERVER_UNAVAILABLE: &str = "The server is temporarily unavailable. Try again in a moment.";

impl UserFacingError {
    /// Surfaced errors for a failed exchange. `Cancelled` never gets here.
    pub fn from_transport(error: &TransportError) -> Self {
        let (message, suggestion) = match error {
            TransportError::Timeout => (
                "The request timed out.".to_string(),
                Some(CHECK_CONNECTION),
            ),
            TransportError::ConnectionFailed { reason } => (
                format!("Could not reach the tutoring server ({reason})."),
                Some(CHECK_CONNECTION),
            ),
            TransportError::Unauthorized => (
                "You are not signed in or your session has expired.".to_string(),
                Some("Sign in again, then retry."),
            ),
            TransportError::ServerError { status, message } if *status >= 500 => {
                (message.clone(), Some(SERVER_UNAVAILABLE))
            }
            TransportError::ServerError { message, .. } => (message.clone(), None),
            TransportError::InvalidResponse(_)
            | TransportError::EncodingFailed(_)
            | TransportError::Cancelled => (
                "Something went wrong while talking to the tutor.".to_string(),
                Some("Please try again."),
            ),
        };
        Self {
            message,
            suggestion: suggestion.map(String::from),
            retryable: true,
        }
    }

    /// Input problem caught before anything was sent
    pub fn rejected_input(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            retryable: false,
        }
    }
}

/// Payload of the last failed exchange, kept for retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSend {
    pub payload: Arc<OutgoingPayload>,
    pub error: TransportError,
}

/// Commands the coordinator refuses in its current state
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Type a question or attach an image first")]
    EmptyMessage,
    #[error("A request is already in progress (cancel it first)")]
    Busy,
    #[error("There is no failed message to retry")]
    NothingToRetry,
    #[error("No request is in progress")]
    NothingToCancel,
    #[error("There is no solution to ask about yet")]
    NoSolutionYet,
    #[error("Name a topic for the refresher")]
    NoRefresherTopic,
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

/// Everything a front end needs to draw the conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub mode: ConversationMode,
    pub session_id: Option<String>,
    pub title: String,
    pub messages: Vec<Message>,
    pub mode_state: ModeState,
    pub progress: LearnerProgress,
    pub preferences: Preferences,
    pub error: Option<UserFacingError>,
    pub can_retry: bool,
    /// One-time startup advisory (health probe)
    pub advisory: Option<String>,
    pub refresher_nudge: Option<Topic>,
}
