//! Session coordinator
//!
//! Sequences learner actions into requests and folds results back into the
//! conversation. Follows an event -> (state change, effects) shape: handling
//! an event never performs I/O, the runtime executes the returned effects.
//!
//! At most one request is in flight. A completion whose request id does not
//! match the in-flight one is stale and dropped without touching state.

mod effect;
mod event;
mod state;

pub use effect::Effect;
pub use event::Event;
pub use state::{CoordinatorError, FailedSend, Phase, Snapshot, UserFacingError};

use crate::conversation::{
    refresher_message, session_title, stuck_message, ConversationStateMachine, LearnerProgress,
    Message, Preferences, Topic, Transcript, TranscriptError, UserInput,
};
use crate::db::SessionRecord;
use crate::runtime::MarkdownRenderer;
use crate::transport::{OutgoingPayload, TransportError};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

struct InFlight {
    request_id: u64,
    payload: Arc<OutgoingPayload>,
}

pub struct SessionCoordinator {
    machine: ConversationStateMachine,
    transcript: Transcript,
    phase: Phase,
    next_request_id: u64,
    in_flight: Option<InFlight>,
    last_failure: Option<FailedSend>,
    error: Option<UserFacingError>,
    advisory: Option<String>,
    refresher_nudge: Option<Topic>,
    /// Local key of the session record
    record_id: String,
    created_at: DateTime<Utc>,
    renderer: Arc<dyn MarkdownRenderer>,
}

impl SessionCoordinator {
    pub fn new(
        record_id: impl Into<String>,
        created_at: DateTime<Utc>,
        preferences: Preferences,
        renderer: Arc<dyn MarkdownRenderer>,
    ) -> Self {
        Self {
            machine: ConversationStateMachine::new(preferences),
            transcript: Transcript::default(),
            phase: Phase::Idle,
            next_request_id: 0,
            in_flight: None,
            last_failure: None,
            error: None,
            advisory: None,
            refresher_nudge: None,
            record_id: record_id.into(),
            created_at,
            renderer,
        }
    }

    /// Resume a stored session
    pub fn restore(&mut self, record: SessionRecord) {
        self.record_id = record.id;
        self.created_at = record.created_at;
        self.machine
            .restore(record.mode, record.session_id, record.mode_state);
        self.transcript = record.transcript;
    }

    pub fn set_progress(&mut self, progress: LearnerProgress) {
        self.machine.set_progress(progress);
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn machine(&self) -> &ConversationStateMachine {
        &self.machine
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn session_record(&self, now: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            id: self.record_id.clone(),
            session_id: self.machine.session_id().map(String::from),
            mode: self.machine.mode(),
            title: session_title(self.transcript.first_user_text()),
            transcript: self.transcript.clone(),
            mode_state: self.machine.state().clone(),
            created_at: self.created_at,
            updated_at: now,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            mode: self.machine.mode(),
            session_id: self.machine.session_id().map(String::from),
            title: session_title(self.transcript.first_user_text()),
            messages: self.transcript.messages().to_vec(),
            mode_state: self.machine.state().clone(),
            progress: self.machine.progress().clone(),
            preferences: self.machine.preferences(),
            error: self.error.clone(),
            can_retry: self.last_failure.is_some() && !self.phase.is_sending(),
            advisory: self.advisory.clone(),
            refresher_nudge: self.refresher_nudge,
        }
    }

    /// "I'm stuck" follow-up about the latest solution
    pub fn stuck_input(&self, step: Option<u32>) -> Result<UserInput, CoordinatorError> {
        let last = self
            .transcript
            .last_assistant_text()
            .ok_or(CoordinatorError::NoSolutionYet)?;
        Ok(UserInput::text(stuck_message(step, last)))
    }

    /// Refresher request for `topic`, or for the pending nudge
    pub fn refresher_input(&self, topic: Option<Topic>) -> Option<UserInput> {
        topic
            .or(self.refresher_nudge)
            .map(|t| UserInput::text(refresher_message(t)))
    }

    /// Apply one event, returning the effects to execute
    pub fn handle(&mut self, event: Event) -> Result<Vec<Effect>, CoordinatorError> {
        match event {
            Event::UserSend { input, at, today } => {
                if input.is_empty() {
                    return Err(CoordinatorError::EmptyMessage);
                }
                if self.phase.is_sending() {
                    return Err(CoordinatorError::Busy);
                }
                let mode = self.machine.mode();
                let payload = self.machine.build_payload(&input);
                self.transcript.push(Message::user(
                    payload.message.clone(),
                    mode,
                    payload.has_image(),
                    at,
                ));
                Ok(self.send_new(payload, today))
            }

            Event::EditLastUserMessage { text, at, today } => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(CoordinatorError::EmptyMessage);
                }
                if self.transcript.last_user_index().is_none() {
                    return Err(TranscriptError::NothingToEdit.into());
                }

                let mut effects: Vec<Effect> = self.abort_in_flight().into_iter().collect();
                let removed = self.transcript.edit_last_user(text, at)?;
                tracing::debug!(removed_reply = removed, "Editing last user message");

                let payload = self.machine.build_payload(&UserInput::text(text));
                effects.extend(self.send_new(payload, today));
                Ok(effects)
            }

            Event::Retry => {
                if self.phase.is_sending() {
                    return Err(CoordinatorError::Busy);
                }
                let failure = self
                    .last_failure
                    .take()
                    .ok_or(CoordinatorError::NothingToRetry)?;
                tracing::info!(
                    mode = %failure.payload.mode,
                    previous_error = %failure.error,
                    "Retrying failed message"
                );
                Ok(vec![self.begin_request(failure.payload)])
            }

            Event::Cancel => {
                let effect = self
                    .abort_in_flight()
                    .ok_or(CoordinatorError::NothingToCancel)?;
                self.phase = Phase::Cancelled;
                Ok(vec![effect])
            }

            Event::SwitchMode(mode) => {
                self.machine.set_mode(mode);
                Ok(self.persist_if_started().into_iter().collect())
            }

            Event::NewSession { id, at } => {
                let mut effects: Vec<Effect> = self.abort_in_flight().into_iter().collect();
                self.machine.reset();
                self.transcript.clear();
                self.phase = Phase::Idle;
                self.last_failure = None;
                self.error = None;
                self.refresher_nudge = None;
                self.record_id = id;
                self.created_at = at;
                Ok(effects)
            }

            Event::OpenSession(record) => {
                let effects: Vec<Effect> = self.abort_in_flight().into_iter().collect();
                tracing::info!(
                    session = %record.id,
                    messages = record.transcript.len(),
                    "Opening stored session"
                );
                self.restore(*record);
                self.phase = Phase::Idle;
                self.last_failure = None;
                self.error = None;
                self.refresher_nudge = None;
                Ok(effects)
            }

            Event::ToggleBookmark(index) => {
                self.transcript.toggle_bookmark(index)?;
                Ok(vec![Effect::PersistSession])
            }

            Event::SetShowSteps(show) => {
                self.machine.set_show_steps(show);
                Ok(vec![])
            }

            Event::SetExplainStyle(style) => {
                self.machine.set_explain_style(style);
                Ok(vec![])
            }

            Event::RequestCompleted {
                request_id,
                result,
                at,
            } => Ok(self.complete_request(request_id, result, at)),

            Event::Advisory(text) => {
                self.advisory = Some(text);
                Ok(vec![])
            }

            Event::InputRejected(message) => {
                self.error = Some(UserFacingError::rejected_input(message));
                Ok(vec![])
            }

            Event::DismissError => {
                self.error = None;
                self.advisory = None;
                Ok(vec![])
            }
        }
    }

    /// Empty sessions are never stored
    fn persist_if_started(&self) -> Option<Effect> {
        (!self.transcript.is_empty()).then_some(Effect::PersistSession)
    }

    /// Effects for a freshly built payload whose user turn is already in
    /// the transcript
    fn send_new(&mut self, payload: OutgoingPayload, today: NaiveDate) -> Vec<Effect> {
        let progress_changed = self.machine.record_user_activity(&payload.message, today);
        self.last_failure = None;
        self.refresher_nudge = None;

        let mut effects = vec![
            self.begin_request(Arc::new(payload)),
            Effect::PersistSession,
        ];
        if progress_changed {
            effects.push(Effect::PersistProgress);
        }
        effects
    }

    fn begin_request(&mut self, payload: Arc<OutgoingPayload>) -> Effect {
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        self.phase = Phase::Sending { request_id };
        self.error = None;
        self.in_flight = Some(InFlight {
            request_id,
            payload: Arc::clone(&payload),
        });
        Effect::StartRequest {
            request_id,
            payload,
        }
    }

    fn abort_in_flight(&mut self) -> Option<Effect> {
        let in_flight = self.in_flight.take()?;
        self.phase = Phase::Idle;
        Some(Effect::AbortRequest {
            request_id: in_flight.request_id,
        })
    }

    fn complete_request(
        &mut self,
        request_id: u64,
        result: Result<crate::transport::ServerResponse, TransportError>,
        at: DateTime<Utc>,
    ) -> Vec<Effect> {
        let Some(in_flight) = self.in_flight.take_if(|f| f.request_id == request_id) else {
            tracing::debug!(request_id, "Discarding stale request completion");
            return vec![];
        };
        self.phase = Phase::Idle;

        match result {
            Ok(response) => {
                let display = self.renderer.render(&response.response);
                let delta = self.machine.apply_response(in_flight.payload.mode, &response);
                self.transcript.push(
                    Message::assistant(response.response, display, self.machine.mode(), at)
                        .with_problem_count(delta.problem_count),
                );
                self.last_failure = None;
                self.error = None;
                if let Some(topic) = delta.refresher {
                    tracing::info!(topic = %topic, "Offering refresher after repeated mistakes");
                    self.refresher_nudge = Some(topic);
                }

                let mut effects = vec![Effect::PersistSession];
                if delta.progress_changed() {
                    effects.push(Effect::PersistProgress);
                }
                effects
            }
            Err(TransportError::Cancelled) => vec![],
            Err(error) => {
                tracing::warn!(request_id, error = %error, "Message failed");
                self.error = Some(UserFacingError::from_transport(&error));
                self.last_failure = Some(FailedSend {
                    payload: in_flight.payload,
                    error,
                });
                vec![]
            }
        }
    }
}
