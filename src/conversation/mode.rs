//! Tutoring modes and follow-up actions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseError {
    kind: &'static str,
    value: String,
}

impl ParseError {
    pub(super) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Interaction style; exactly one is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    #[default]
    Solve,
    Explain,
    Quiz,
    Exam,
}

impl ConversationMode {
    pub const ALL: [ConversationMode; 4] = [
        ConversationMode::Solve,
        ConversationMode::Explain,
        ConversationMode::Quiz,
        ConversationMode::Exam,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConversationMode::Solve => "solve",
            ConversationMode::Explain => "explain",
            ConversationMode::Quiz => "quiz",
            ConversationMode::Exam => "exam",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ConversationMode::Solve => "Step-by-step solutions with verification",
            ConversationMode::Explain => "Conceptual breakdowns with visuals",
            ConversationMode::Quiz => "Practice problems at increasing difficulty",
            ConversationMode::Exam => "Exam-style problems with grading",
        }
    }
}

impl fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::new("mode", s))
    }
}

/// Explain-mode follow-ups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainAction {
    Deeper,
    Differently,
    Verify,
}

impl ExplainAction {
    /// Fixed message sent on the learner's behalf
    pub fn message(self) -> &'static str {
        match self {
            ExplainAction::Deeper => {
                "I want to understand this concept more deeply. Can you go into more detail?"
            }
            ExplainAction::Differently => {
                "I didn't quite understand that. Can you explain it a different way?"
            }
            ExplainAction::Verify => "I'm ready to explain it back.",
        }
    }
}

/// Quiz-mode follow-ups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizAction {
    Similar,
    Harder,
    NewTopic,
}

impl QuizAction {
    pub fn message(self) -> &'static str {
        match self {
            QuizAction::Similar => "Give me a similar problem so I can practice the same idea.",
            QuizAction::Harder => "Give me a harder variant to test myself.",
            QuizAction::NewTopic => "Let's move on. Give me a problem on a new topic.",
        }
    }
}

/// Self-reported confidence after a solution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn message(self) -> &'static str {
        match self {
            Confidence::Low => {
                "My confidence is low. Give me a simpler explanation and a very easy example."
            }
            Confidence::Medium => {
                "My confidence is medium. Give me one more example and a quick check question."
            }
            Confidence::High => "My confidence is high. Give me a harder variant to test myself.",
        }
    }
}

impl FromStr for Confidence {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" | "med" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            _ => Err(ParseError::new("confidence", s)),
        }
    }
}

/// How explanations are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExplainStyle {
    #[default]
    Intuition,
    Equation,
}

impl FromStr for ExplainStyle {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intuition" => Ok(ExplainStyle::Intuition),
            "equation" => Ok(ExplainStyle::Equation),
            _ => Err(ParseError::new("explain style", s)),
        }
    }
}
