//! Effects produced by coordinator transitions

use crate::transport::OutgoingPayload;
use std::sync::Arc;

/// Work the runtime performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send the payload through the request engine
    StartRequest {
        request_id: u64,
        payload: Arc<OutgoingPayload>,
    },

    /// Cancel an in-flight request; its result must be ignored
    AbortRequest { request_id: u64 },

    /// Write the current session record
    PersistSession,

    /// Write the learner's cross-session progress
    PersistProgress,
}
