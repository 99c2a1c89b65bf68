//! Runtime for a tutoring session
//!
//! One task owns the [`SessionCoordinator`](crate::coordinator::SessionCoordinator).
//! Commands come in over an mpsc channel, request completions are marshalled
//! back onto the same task, and every state change is published as a
//! [`Snapshot`] on a watch channel.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use traits::*;

use crate::conversation::{ConversationMode, ExplainStyle, Topic, UserInput};
use crate::coordinator::{CoordinatorError, Snapshot};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

/// Learner-level commands accepted by the runtime
#[derive(Debug, Clone)]
pub enum Command {
    Send(UserInput),
    /// Attach the image at `path` to `text`
    SendImage { text: String, path: PathBuf },
    Edit(String),
    Retry,
    Cancel,
    SwitchMode(ConversationMode),
    NewSession,
    /// Reopen a stored session by its local record id
    OpenSession(String),
    ToggleBookmark(usize),
    SetShowSteps(bool),
    SetExplainStyle(ExplainStyle),
    /// Ask for help with one step of the latest solution
    Stuck(Option<u32>),
    /// Refresher on a topic, or on the pending nudge
    Refresher(Option<Topic>),
    Advisory(String),
    DismissError,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error(transparent)]
    Rejected(#[from] CoordinatorError),
    #[error("Could not open session: {0}")]
    SessionUnavailable(String),
    #[error("Session runtime has stopped")]
    Stopped,
}

pub(crate) struct Envelope {
    pub command: Command,
    pub reply: oneshot::Sender<Result<(), CommandError>>,
}

/// Handle for talking to a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Envelope>,
    snapshots: watch::Receiver<Snapshot>,
}

impl SessionHandle {
    /// Run a command and wait until the runtime has applied it
    pub async fn execute(&self, command: Command) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Envelope { command, reply })
            .await
            .map_err(|_| CommandError::Stopped)?;
        rx.await.map_err(|_| CommandError::Stopped)?
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }
}
