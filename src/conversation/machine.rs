//! Mode-aware conversation state
//!
//! Owns the server session id, the per-mode auxiliary state and the
//! learner's progress. Builds outgoing payloads from that state and folds
//! server responses back into it. No I/O happens here.

use super::lexicon::{
    count_quiz_problems, infer_topic, is_affirmative_grading, parse_quiz_verdict, topics_in,
    QuizVerdict, Topic,
};
use super::mode::{ConversationMode, ExplainAction, ExplainStyle, QuizAction};
use super::progress::{LearnerProgress, REFRESHER_THRESHOLD};
use crate::transport::{ImageAttachment, OutgoingPayload, ServerResponse};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const PLOT_MODE: &str = "auto";

const TITLE_WORDS: usize = 5;
const TITLE_MAX_CHARS: usize = 36;
const TITLE_KEEP_CHARS: usize = 33;

/// Auxiliary per-mode state. Retained across mode switches; cleared only
/// by a new session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeState {
    /// Exam: the next user message is an answer to a posed problem
    pub awaiting_exam_answer: bool,
    /// Explain: the concept later follow-ups refer back to
    pub original_concept: Option<String>,
    pub exam_correct: u32,
    pub exam_total: u32,
    pub quiz_correct: u32,
    pub quiz_total: u32,
    /// Quiz: problem text of an answer check awaiting its verdict
    pub pending_quiz_problem: Option<String>,
}

/// User settings that shape every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub show_steps: bool,
    pub explain_style: ExplainStyle,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            show_steps: true,
            explain_style: ExplainStyle::default(),
        }
    }
}

/// What the learner asked for in one send
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInput {
    pub text: String,
    pub image: Option<ImageAttachment>,
    pub explain_action: Option<ExplainAction>,
    pub quiz_action: Option<QuizAction>,
    /// Problem text when this message checks a quiz answer
    pub quiz_problem: Option<String>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }

    pub fn explain(action: ExplainAction) -> Self {
        Self {
            text: action.message().to_string(),
            explain_action: Some(action),
            ..Self::default()
        }
    }

    pub fn quiz(action: QuizAction) -> Self {
        Self {
            text: action.message().to_string(),
            quiz_action: Some(action),
            ..Self::default()
        }
    }

    pub fn quiz_check(title: &str, problem: &str, answer: &str) -> Self {
        Self {
            text: quiz_check_message(title, problem, answer),
            quiz_problem: Some(problem.to_string()),
            ..Self::default()
        }
    }

    /// Nothing to send: no text and no image
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.image.is_none()
    }
}

/// Observable consequences of applying one response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseDelta {
    pub session_changed: bool,
    /// Exam: whether a graded answer counted as correct
    pub exam_graded: Option<bool>,
    pub quiz_verdict: Option<QuizVerdict>,
    pub new_topics: Vec<Topic>,
    /// Topic whose mistakes just reached the refresher threshold
    pub refresher: Option<Topic>,
    pub problem_count: usize,
}

impl ResponseDelta {
    /// Whether cross-session progress changed and should be persisted
    pub fn progress_changed(&self) -> bool {
        !self.new_topics.is_empty() || self.quiz_verdict == Some(QuizVerdict::Incorrect)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationStateMachine {
    mode: ConversationMode,
    session_id: Option<String>,
    state: ModeState,
    preferences: Preferences,
    progress: LearnerProgress,
}

impl ConversationStateMachine {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            preferences,
            ..Self::default()
        }
    }

    /// Rebuild from persisted parts
    pub fn restore(
        &mut self,
        mode: ConversationMode,
        session_id: Option<String>,
        state: ModeState,
    ) {
        self.mode = mode;
        self.session_id = session_id;
        self.state = state;
    }

    pub fn mode(&self) -> ConversationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ConversationMode) {
        self.mode = mode;
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn state(&self) -> &ModeState {
        &self.state
    }

    pub fn preferences(&self) -> Preferences {
        self.preferences
    }

    pub fn set_show_steps(&mut self, show_steps: bool) {
        self.preferences.show_steps = show_steps;
    }

    pub fn set_explain_style(&mut self, style: ExplainStyle) {
        self.preferences.explain_style = style;
    }

    pub fn progress(&self) -> &LearnerProgress {
        &self.progress
    }

    pub fn set_progress(&mut self, progress: LearnerProgress) {
        self.progress = progress;
    }

    /// Build the payload for one send and update the anchors it implies
    pub fn build_payload(&mut self, input: &UserInput) -> OutgoingPayload {
        let text = input.text.trim();

        if self.mode == ConversationMode::Explain
            && input.explain_action.is_none()
            && !text.is_empty()
        {
            self.state.original_concept = Some(text.to_string());
        }
        if self.mode == ConversationMode::Quiz {
            self.state.pending_quiz_problem = input.quiz_problem.clone();
        }

        let exam = self.mode == ConversationMode::Exam;
        OutgoingPayload {
            message: text.to_string(),
            image: input.image.as_ref().map(|i| i.data.clone()),
            image_mime_type: input.image.as_ref().map(|i| i.mime_type.clone()),
            mode: self.mode,
            session_id: self.session_id.clone(),
            explain_action: input.explain_action,
            quiz_action: input.quiz_action,
            original_concept: match self.mode {
                ConversationMode::Explain => self.state.original_concept.clone(),
                _ => None,
            },
            plot_mode: PLOT_MODE,
            show_steps: !exam && self.preferences.show_steps,
            explain_style: self.preferences.explain_style,
            exam_answer: exam && self.state.awaiting_exam_answer,
        }
    }

    /// Streak and topic bookkeeping for an outgoing user message.
    /// Returns whether progress changed.
    pub fn record_user_activity(&mut self, text: &str, today: NaiveDate) -> bool {
        let streak_changed = self.progress.streak.record_activity(today);
        let new_topics = self.progress.mark_covered(topics_in(text));
        streak_changed || !new_topics.is_empty()
    }

    /// Fold a successful response into state. `sent_mode` is the mode the
    /// answered payload was sent in.
    pub fn apply_response(
        &mut self,
        sent_mode: ConversationMode,
        response: &ServerResponse,
    ) -> ResponseDelta {
        let mut delta = ResponseDelta::default();
        let text = response.response.as_str();

        if let Some(id) = &response.session_id {
            delta.session_changed = self.session_id.as_deref() != Some(id.as_str());
            self.session_id = Some(id.clone());
        }

        match sent_mode {
            ConversationMode::Exam => {
                if self.state.awaiting_exam_answer {
                    let correct = is_affirmative_grading(text);
                    self.state.exam_total += 1;
                    if correct {
                        self.state.exam_correct += 1;
                    }
                    self.state.awaiting_exam_answer = false;
                    delta.exam_graded = Some(correct);
                } else {
                    self.state.awaiting_exam_answer = true;
                }
            }
            ConversationMode::Quiz => {
                delta.problem_count = count_quiz_problems(text);
                let pending = self.state.pending_quiz_problem.take();
                if let Some(verdict) = parse_quiz_verdict(text) {
                    self.state.quiz_total += 1;
                    match verdict {
                        QuizVerdict::Correct => self.state.quiz_correct += 1,
                        QuizVerdict::Incorrect => {
                            if let Some(topic) = pending.as_deref().and_then(infer_topic) {
                                if self.progress.record_mistake(topic) == REFRESHER_THRESHOLD {
                                    delta.refresher = Some(topic);
                                }
                            }
                        }
                    }
                    delta.quiz_verdict = Some(verdict);
                }
            }
            ConversationMode::Solve | ConversationMode::Explain => {}
        }

        delta.new_topics = self.progress.mark_covered(topics_in(text));
        delta
    }

    /// Start a new session. Progress is kept.
    pub fn reset(&mut self) {
        self.session_id = None;
        self.state = ModeState::default();
    }
}

pub fn quiz_check_message(title: &str, problem: &str, answer: &str) -> String {
    format!(
        "I'm working on {title}:\n\n{problem}\n\nMy answer: {answer}\n\n\
         Check my work and provide feedback. End with:\nRESULT: CORRECT or RESULT: INCORRECT."
    )
}

pub fn stuck_message(step: Option<u32>, last_solution: &str) -> String {
    let step = step.map_or_else(|| "a specific step".to_string(), |n| format!("Step {n}"));
    format!(
        "I'm stuck on {step}. Here is your last solution:\n\n{last_solution}\n\n\
         Please explain only that step simply and briefly."
    )
}

pub fn refresher_message(topic: Topic) -> String {
    format!("Give me a 2-minute refresher on {topic} with one simple example.")
}

/// Short title from the first user message
pub fn session_title(first_user_text: Option<&str>) -> String {
    let words: Vec<&str> = first_user_text
        .unwrap_or_default()
        .split_whitespace()
        .take(TITLE_WORDS)
        .collect();
    if words.is_empty() {
        return "New session".to_string();
    }
    let title = words.join(" ");
    if title.chars().count() > TITLE_MAX_CHARS {
        let head: String = title.chars().take(TITLE_KEEP_CHARS).collect();
        format!("{head}...")
    } else {
        title
    }
}
