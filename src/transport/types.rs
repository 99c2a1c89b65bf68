//! Wire types for the chat endpoint

use crate::conversation::{ConversationMode, ExplainAction, ExplainStyle, QuizAction};
use serde::{Deserialize, Serialize};

/// Optimized image ready for upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// Base64-encoded bytes, no data-url prefix
    pub data: String,
    pub mime_type: String,
}

/// Request body for one exchange. Built once per send and never mutated;
/// retries reuse the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "image_type", skip_serializing_if = "Option::is_none")]
    pub image_mime_type: Option<String>,
    pub mode: ConversationMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain_action: Option<ExplainAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_action: Option<QuizAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_concept: Option<String>,
    pub plot_mode: &'static str,
    pub show_steps: bool,
    pub explain_style: ExplainStyle,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub exam_answer: bool,
}

impl OutgoingPayload {
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Raw response body, success or failure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseBody {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
    pub response: String,
    pub session_id: Option<String>,
}

impl ServerResponse {
    pub fn new(response: impl Into<String>, session_id: Option<&str>) -> Self {
        Self {
            response: response.into(),
            session_id: session_id.map(String::from),
        }
    }
}
