//! Events driving the session coordinator

use crate::conversation::{ConversationMode, ExplainStyle, UserInput};
use crate::db::SessionRecord;
use crate::transport::{ServerResponse, TransportError};
use chrono::{DateTime, NaiveDate, Utc};

/// Everything that can happen to a session. Clock readings are stamped on
/// by the caller so handling stays deterministic.
#[derive(Debug, Clone)]
pub enum Event {
    /// Learner sends a new message
    UserSend {
        input: UserInput,
        at: DateTime<Utc>,
        today: NaiveDate,
    },

    /// Learner rewrites their latest message and resubmits it
    EditLastUserMessage {
        text: String,
        at: DateTime<Utc>,
        today: NaiveDate,
    },

    /// Resubmit the payload of the last failed exchange
    Retry,

    Cancel,

    SwitchMode(ConversationMode),

    NewSession { id: String, at: DateTime<Utc> },

    /// Switch to a stored session, abandoning any in-flight request
    OpenSession(Box<SessionRecord>),

    ToggleBookmark(usize),

    SetShowSteps(bool),

    SetExplainStyle(ExplainStyle),

    /// A spawned request finished, successfully or not
    RequestCompleted {
        request_id: u64,
        result: Result<ServerResponse, TransportError>,
        at: DateTime<Utc>,
    },

    /// One-time advisory, e.g. from the startup health probe
    Advisory(String),

    /// Input refused before sending (image too large, unreadable file)
    InputRejected(String),

    DismissError,
}
