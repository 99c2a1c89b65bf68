//! Transcript messages
//!
//! The transcript is append-only. The only in-place changes are the
//! bookmark flag and editing the most recent user message, which also drops
//! the assistant reply that followed it.

use super::mode::ConversationMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Raw text as typed or as returned by the backend
    pub content: String,
    /// Render-ready form (markdown rendered for assistant messages)
    pub display: String,
    pub mode: ConversationMode,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_bookmarked: bool,
    #[serde(default)]
    pub has_image: bool,
    /// Numbered practice problems found in a quiz response
    #[serde(default)]
    pub problem_count: usize,
}

impl Message {
    pub fn user(
        content: impl Into<String>,
        mode: ConversationMode,
        has_image: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        let display = if content.is_empty() && has_image {
            "[Image]".to_string()
        } else {
            content.clone()
        };
        Self {
            role: Role::User,
            content,
            display,
            mode,
            timestamp,
            is_bookmarked: false,
            has_image,
            problem_count: 0,
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        display: String,
        mode: ConversationMode,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            display,
            mode,
            timestamp,
            is_bookmarked: false,
            has_image: false,
            problem_count: 0,
        }
    }

    pub fn with_problem_count(mut self, count: usize) -> Self {
        self.problem_count = count;
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("No message at position {0}")]
    NoSuchMessage(usize),
    #[error("There is no user message to edit")]
    NothingToEdit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl FromIterator<Message> for Transcript {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

impl Transcript {
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn toggle_bookmark(&mut self, index: usize) -> Result<bool, TranscriptError> {
        let message = self
            .messages
            .get_mut(index)
            .ok_or(TranscriptError::NoSuchMessage(index))?;
        message.is_bookmarked = !message.is_bookmarked;
        Ok(message.is_bookmarked)
    }

    pub fn last_user_index(&self) -> Option<usize> {
        self.messages.iter().rposition(|m| m.role == Role::User)
    }

    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn first_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User && !m.content.is_empty())
            .map(|m| m.content.as_str())
    }

    /// Replace the latest user message's text and drop the assistant reply
    /// directly after it. Returns whether a reply was removed.
    pub fn edit_last_user(
        &mut self,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, TranscriptError> {
        let index = self
            .last_user_index()
            .ok_or(TranscriptError::NothingToEdit)?;

        let removed = matches!(
            self.messages.get(index + 1),
            Some(m) if m.role == Role::Assistant
        );
        if removed {
            self.messages.remove(index + 1);
        }

        let message = &mut self.messages[index];
        message.content = text.to_string();
        message.display = text.to_string();
        // Edits resend text only
        message.has_image = false;
        message.timestamp = timestamp;
        Ok(removed)
    }
}
