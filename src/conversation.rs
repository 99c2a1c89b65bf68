//! Conversation model
//!
//! Modes, transcript, learner progress and the state machine that turns
//! user intent into outgoing payloads.

mod lexicon;
mod machine;
mod message;
mod mode;
mod progress;

#[cfg(test)]
mod proptests;

pub use lexicon::Topic;
pub use machine::{
    refresher_message, session_title, stuck_message, ConversationStateMachine, ModeState,
    Preferences, UserInput,
};
pub use message::{Message, Role, Transcript, TranscriptError};
pub use mode::{Confidence, ConversationMode, ExplainAction, ExplainStyle, QuizAction};
pub use progress::LearnerProgress;
