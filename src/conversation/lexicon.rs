//! Keyword tables and text matchers
//!
//! All matching is case-insensitive substring matching against fixed
//! tables, except quiz problem markers which need line anchors.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use super::mode::ParseError;

/// Curriculum topics tracked in learner progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Limits,
    Continuity,
    Derivatives,
    Integrals,
    Applications,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::Limits,
        Topic::Continuity,
        Topic::Derivatives,
        Topic::Integrals,
        Topic::Applications,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Topic::Limits => "Limits",
            Topic::Continuity => "Continuity",
            Topic::Derivatives => "Derivatives",
            Topic::Integrals => "Integrals",
            Topic::Applications => "Applications",
        }
    }

    pub fn keywords(self) -> &'static [&'static str] {
        TOPIC_KEYWORDS
            .iter()
            .find(|(topic, _)| *topic == self)
            .map_or(&[], |(_, words)| *words)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Topic {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.title().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::new("topic", s))
    }
}

/// Topic -> keyword table, in inference priority order
pub const TOPIC_KEYWORDS: &[(Topic, &[&str])] = &[
    (
        Topic::Limits,
        &["limit", "approach", "lhospital", "hopital", "l'hôpital"],
    ),
    (
        Topic::Continuity,
        &["continuity", "continuous", "discontinuous"],
    ),
    (
        Topic::Derivatives,
        &["derivative", "d/dx", "differentiation", "tangent"],
    ),
    (
        Topic::Integrals,
        &["integral", "anti-derivative", "antiderivative", "area under"],
    ),
    (
        Topic::Applications,
        &["optimization", "related rates", "motion", "volume", "application"],
    ),
];

/// Phrases that count an exam answer as correct
pub const AFFIRMATIVE_GRADING: &[&str] = &["correct", "right", "well done", "great job"];

const RESULT_CORRECT: &str = "RESULT: CORRECT";
const RESULT_INCORRECT: &str = "RESULT: INCORRECT";

static PROBLEM_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)Problem \d+|^\d+\.").expect("valid problem marker pattern")
});

/// Every topic whose keywords appear in `text`
pub fn topics_in(text: &str) -> Vec<Topic> {
    let lower = text.to_lowercase();
    Topic::ALL
        .into_iter()
        .filter(|topic| topic.keywords().iter().any(|w| lower.contains(w)))
        .collect()
}

/// First matching topic in table order
pub fn infer_topic(text: &str) -> Option<Topic> {
    topics_in(text).into_iter().next()
}

/// Exam grading heuristic on the assistant's feedback
pub fn is_affirmative_grading(text: &str) -> bool {
    let lower = text.to_lowercase();
    AFFIRMATIVE_GRADING.iter().any(|w| lower.contains(w))
}

/// Verdict marker on a quiz answer check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuizVerdict {
    Correct,
    Incorrect,
}

pub fn parse_quiz_verdict(text: &str) -> Option<QuizVerdict> {
    if text.contains(RESULT_INCORRECT) {
        Some(QuizVerdict::Incorrect)
    } else if text.contains(RESULT_CORRECT) {
        Some(QuizVerdict::Correct)
    } else {
        None
    }
}

/// Number of numbered practice problems in a quiz response
pub fn count_quiz_problems(text: &str) -> usize {
    PROBLEM_MARKER.find_iter(text).count()
}
