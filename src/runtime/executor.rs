//! Session runtime executor

use super::traits::{ConversationStore, ImageError, ImageOptimizer};
use super::{Command, CommandError, Envelope, SessionHandle};
use crate::conversation::UserInput;
use crate::coordinator::{CoordinatorError, Effect, Event, SessionCoordinator, Snapshot};
use crate::transport::{
    ImageAttachment, OutgoingPayload, RequestEngine, ServerResponse, Transport, TransportError,
};
use chrono::{Local, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

const COMMAND_BUFFER: usize = 32;

/// Result of a spawned request, sent back to the runtime task
struct Completion {
    request_id: u64,
    result: Result<ServerResponse, TransportError>,
}

/// Generic session runtime over any transport and store
pub struct SessionRuntime<T, S>
where
    T: Transport + 'static,
    S: ConversationStore + 'static,
{
    coordinator: SessionCoordinator,
    engine: Arc<RequestEngine<T>>,
    store: S,
    images: Arc<dyn ImageOptimizer>,
    commands: mpsc::Receiver<Envelope>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    snapshot_tx: watch::Sender<Snapshot>,
    /// Token of the in-flight request
    in_flight: Option<(u64, CancellationToken)>,
}

impl<T, S> SessionRuntime<T, S>
where
    T: Transport + 'static,
    S: ConversationStore + 'static,
{
    pub fn new(
        coordinator: SessionCoordinator,
        engine: RequestEngine<T>,
        store: S,
        images: Arc<dyn ImageOptimizer>,
    ) -> (Self, SessionHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completion_tx, completion_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshots) = watch::channel(coordinator.snapshot());

        let runtime = Self {
            coordinator,
            engine: Arc::new(engine),
            store,
            images,
            commands,
            completion_tx,
            completion_rx,
            snapshot_tx,
            in_flight: None,
        };
        let handle = SessionHandle {
            commands: command_tx,
            snapshots,
        };
        (runtime, handle)
    }

    /// Restore stored state, then process commands until every handle is
    /// dropped
    pub async fn run(mut self) {
        tracing::info!(session = %self.coordinator.record_id(), "Starting session runtime");
        self.restore().await;
        self.publish();

        loop {
            tokio::select! {
                envelope = self.commands.recv() => {
                    let Some(Envelope { command, reply }) = envelope else {
                        break;
                    };
                    let result = self.process_command(command).await;
                    if let Err(e) = &result {
                        tracing::debug!(error = %e, "Command rejected");
                    }
                    let _ = reply.send(result);
                }
                Some(done) = self.completion_rx.recv() => {
                    if matches!(&self.in_flight, Some((id, _)) if *id == done.request_id) {
                        self.in_flight = None;
                    }
                    let event = Event::RequestCompleted {
                        request_id: done.request_id,
                        result: done.result,
                        at: Utc::now(),
                    };
                    if let Err(e) = self.dispatch(event).await {
                        tracing::error!(error = %e, "Error applying request completion");
                    }
                }
            }
        }

        if let Some((_, token)) = self.in_flight.take() {
            token.cancel();
        }
        tracing::info!("Session runtime stopped");
    }

    async fn restore(&mut self) {
        match self.store.load_progress().await {
            Ok(progress) => self.coordinator.set_progress(progress),
            Err(e) => tracing::warn!(error = %e, "Failed to load learner progress"),
        }
        match self.store.latest_session().await {
            Ok(Some(record)) => {
                tracing::info!(
                    session = %record.id,
                    messages = record.transcript.len(),
                    mode = %record.mode,
                    "Restored previous session"
                );
                self.coordinator.restore(record);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to load previous session"),
        }
    }

    async fn process_command(&mut self, command: Command) -> Result<(), CommandError> {
        let at = Utc::now();
        let today = Local::now().date_naive();
        let send = |input: UserInput| Event::UserSend { input, at, today };

        let event = match command {
            Command::Send(input) => send(input),
            Command::SendImage { text, path } => match self.load_image(&path).await {
                Ok(image) => send(UserInput::text(text).with_image(image)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Image rejected");
                    Event::InputRejected(e.to_string())
                }
            },
            Command::Edit(text) => Event::EditLastUserMessage { text, at, today },
            Command::Retry => Event::Retry,
            Command::Cancel => Event::Cancel,
            Command::SwitchMode(mode) => Event::SwitchMode(mode),
            Command::NewSession => Event::NewSession {
                id: uuid::Uuid::new_v4().to_string(),
                at,
            },
            Command::OpenSession(id) => {
                let record = self.store.load_session(&id).await.map_err(|e| {
                    tracing::warn!(session = %id, error = %e, "Failed to load session");
                    CommandError::SessionUnavailable(e)
                })?;
                Event::OpenSession(Box::new(record))
            }
            Command::ToggleBookmark(index) => Event::ToggleBookmark(index),
            Command::SetShowSteps(show) => Event::SetShowSteps(show),
            Command::SetExplainStyle(style) => Event::SetExplainStyle(style),
            Command::Stuck(step) => send(self.coordinator.stuck_input(step)?),
            Command::Refresher(topic) => send(
                self.coordinator
                    .refresher_input(topic)
                    .ok_or(CoordinatorError::NoRefresherTopic)?,
            ),
            Command::Advisory(text) => Event::Advisory(text),
            Command::DismissError => Event::DismissError,
        };

        self.dispatch(event).await?;
        Ok(())
    }

    async fn load_image(&self, path: &Path) -> Result<ImageAttachment, ImageError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ImageError::Unreadable(e.to_string()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.images.optimize(name, &bytes)
    }

    /// Apply an event and execute its effects
    async fn dispatch(&mut self, event: Event) -> Result<(), CoordinatorError> {
        let effects = self.coordinator.handle(event)?;
        for effect in effects {
            self.execute_effect(effect).await;
        }
        self.publish();
        Ok(())
    }

    async fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::StartRequest {
                request_id,
                payload,
            } => self.start_request(request_id, payload),

            Effect::AbortRequest { request_id } => match self.in_flight.take() {
                Some((id, token)) if id == request_id => {
                    tracing::info!(request_id, "Cancelling in-flight request");
                    token.cancel();
                }
                other => self.in_flight = other,
            },

            Effect::PersistSession => {
                let record = self.coordinator.session_record(Utc::now());
                if let Err(e) = self.store.save_session(&record).await {
                    tracing::warn!(session = %record.id, error = %e, "Failed to save session");
                }
            }

            Effect::PersistProgress => {
                let progress = self.coordinator.machine().progress();
                if let Err(e) = self.store.save_progress(progress).await {
                    tracing::warn!(error = %e, "Failed to save learner progress");
                }
            }
        }
    }

    fn start_request(&mut self, request_id: u64, payload: Arc<OutgoingPayload>) {
        let token = CancellationToken::new();
        if let Some((previous, old)) = self.in_flight.replace((request_id, token.clone())) {
            tracing::debug!(request_id = previous, "Superseding previous request");
            old.cancel();
        }

        let engine = Arc::clone(&self.engine);
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            tracing::info!(request_id, mode = %payload.mode, "Sending message (background)");
            let result = engine.send(&payload, &token).await;
            if matches!(result, Err(TransportError::Cancelled)) {
                tracing::info!(request_id, "Request cancelled");
            }
            let _ = completion_tx.send(Completion { request_id, result }).await;
        });
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(self.coordinator.snapshot());
    }
}
