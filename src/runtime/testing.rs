//! Mock implementations for testing
//!
//! These mocks enable runtime tests without real I/O.

use super::traits::ConversationStore;
use crate::conversation::LearnerProgress;
use crate::db::SessionRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// In-Memory Store
// ============================================================================

/// Store that keeps everything in memory; writes can be made to fail
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    progress: Mutex<Option<LearnerProgress>>,
    fail_writes: AtomicBool,
    /// Number of successful session writes
    pub session_saves: AtomicUsize,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, record: SessionRecord) -> Self {
        self.sessions
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
        self
    }

    pub fn with_progress(self, progress: LearnerProgress) -> Self {
        *self.progress.lock().unwrap() = Some(progress);
        self
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn session(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    pub fn progress(&self) -> Option<LearnerProgress> {
        self.progress.lock().unwrap().clone()
    }

    fn check_writable(&self) -> Result<(), String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err("disk full".to_string())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn save_session(&self, record: &SessionRecord) -> Result<(), String> {
        self.check_writable()?;
        self.sessions
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        self.session_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_session(&self, id: &str) -> Result<SessionRecord, String> {
        self.session(id)
            .ok_or_else(|| format!("Session not found: {id}"))
    }

    async fn latest_session(&self) -> Result<Option<SessionRecord>, String> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .max_by_key(|r| r.updated_at)
            .cloned())
    }

    async fn save_progress(&self, progress: &LearnerProgress) -> Result<(), String> {
        self.check_writable()?;
        *self.progress.lock().unwrap() = Some(progress.clone());
        Ok(())
    }

    async fn load_progress(&self) -> Result<LearnerProgress, String> {
        Ok(self.progress().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{
        ConversationMode, Message, Preferences, Topic, UserInput,
    };
    use crate::coordinator::{CoordinatorError, Phase, SessionCoordinator, Snapshot};
    use crate::runtime::{
        Base64ImageOptimizer, CmarkRenderer, Command, CommandError, SessionHandle, SessionRuntime,
    };
    use crate::transport::testing::MockTransport;
    use crate::transport::{
        RequestEngine, RetryPolicy, ServerResponse, TimeoutPolicy, TransportError,
    };
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    fn start(mock: &Arc<MockTransport>, store: &Arc<MemoryStore>) -> SessionHandle {
        let coordinator = SessionCoordinator::new(
            "local-test",
            Utc::now(),
            Preferences::default(),
            Arc::new(CmarkRenderer),
        );
        let engine = RequestEngine::new(
            Arc::clone(mock),
            RetryPolicy::default(),
            TimeoutPolicy::default(),
        );
        let (runtime, handle) = SessionRuntime::new(
            coordinator,
            engine,
            Arc::clone(store),
            Arc::new(Base64ImageOptimizer),
        );
        tokio::spawn(runtime.run());
        handle
    }

    async fn wait_until(
        handle: &SessionHandle,
        predicate: impl FnMut(&Snapshot) -> bool,
    ) -> Snapshot {
        let mut rx = handle.subscribe();
        let snapshot = tokio::time::timeout(Duration::from_secs(300), rx.wait_for(predicate))
            .await
            .expect("snapshot condition not reached")
            .expect("runtime stopped");
        snapshot.clone()
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = MemoryStore::new();
        assert!(store.latest_session().await.unwrap().is_none());

        let now = Utc::now();
        let mut older = SessionRecord::new("a", ConversationMode::Solve, now);
        older.updated_at = now - ChronoDuration::minutes(5);
        store.save_session(&older).await.unwrap();
        store
            .save_session(&SessionRecord::new("b", ConversationMode::Quiz, now))
            .await
            .unwrap();
        assert_eq!(store.latest_session().await.unwrap().unwrap().id, "b");

        store.fail_writes(true);
        assert!(store.save_progress(&LearnerProgress::default()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_and_persist() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_response(ServerResponse::new("2x", Some("s1")));
        let store = Arc::new(MemoryStore::new());
        let handle = start(&mock, &store);

        handle
            .execute(Command::Send(UserInput::text("Find the derivative of x^2")))
            .await
            .unwrap();
        let snapshot = wait_until(&handle, |s| s.messages.len() == 2).await;

        assert_eq!(snapshot.session_id.as_deref(), Some("s1"));
        assert_eq!(snapshot.phase, Phase::Idle);
        assert!(snapshot.progress.is_covered(Topic::Derivatives));

        let calls = mock.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].json()["message"], "Find the derivative of x^2");
        assert_eq!(calls[0].json()["mode"], "solve");

        // Persist runs before the snapshot is published
        let saved = store.session("local-test").unwrap();
        assert_eq!(saved.transcript.len(), 2);
        assert_eq!(saved.session_id.as_deref(), Some("s1"));
        assert!(store.progress().unwrap().is_covered(Topic::Derivatives));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restores_latest_session_and_progress() {
        let now = Utc::now();
        let mut record = SessionRecord::new("stored", ConversationMode::Exam, now);
        record.session_id = Some("s7".to_string());
        record.mode_state.awaiting_exam_answer = true;
        record.transcript = std::iter::once(Message::user(
            "Give me a limits problem",
            ConversationMode::Exam,
            false,
            now,
        ))
        .collect();
        let mut progress = LearnerProgress::default();
        progress.mark_covered([Topic::Integrals]);

        let store = Arc::new(
            MemoryStore::new()
                .with_session(record)
                .with_progress(progress),
        );
        let mock = Arc::new(MockTransport::new());
        mock.queue_response(ServerResponse::new("Correct! Well done.", Some("s7")));
        let handle = start(&mock, &store);

        handle
            .execute(Command::Send(UserInput::text("the limit is 5")))
            .await
            .unwrap();
        let snapshot = wait_until(&handle, |s| s.messages.len() == 3).await;

        let body = mock.recorded_calls()[0].json();
        assert_eq!(body["session_id"], "s7");
        assert_eq!(body["exam_answer"], true);
        assert_eq!(snapshot.mode_state.exam_correct, 1);
        assert!(snapshot.progress.is_covered(Topic::Integrals));
        assert!(store.session("stored").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures_then_succeeds() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_error(TransportError::server_error(503, None));
        mock.queue_error(TransportError::Timeout);
        mock.queue_response(ServerResponse::new("x^2/2 + C", Some("s1")));
        let store = Arc::new(MemoryStore::new());
        let handle = start(&mock, &store);

        handle
            .execute(Command::Send(UserInput::text("integrate x")))
            .await
            .unwrap();
        let snapshot = wait_until(&handle, |s| s.messages.len() == 2).await;
        assert!(snapshot.error.is_none());
        assert_eq!(mock.recorded_calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_surfaces_error_and_retry_works() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_error(TransportError::Unauthorized);
        let store = Arc::new(MemoryStore::new());
        let handle = start(&mock, &store);

        handle
            .execute(Command::Send(UserInput::text("what is a limit")))
            .await
            .unwrap();
        let snapshot = wait_until(&handle, |s| s.error.is_some()).await;
        assert!(snapshot.can_retry);
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(mock.recorded_calls().len(), 1);

        mock.queue_response(ServerResponse::new("A limit describes...", Some("s1")));
        handle.execute(Command::Retry).await.unwrap();
        let snapshot = wait_until(&handle, |s| s.messages.len() == 2).await;
        assert!(snapshot.error.is_none());

        let calls = mock.recorded_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].body, calls[1].body);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_slow_response() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_delayed(
            Duration::from_secs(10),
            Ok(ServerResponse::new("too late", Some("s1"))),
        );
        let store = Arc::new(MemoryStore::new());
        let handle = start(&mock, &store);

        handle
            .execute(Command::Send(UserInput::text("slow question")))
            .await
            .unwrap();
        mock.request_started.notified().await;
        handle.execute(Command::Cancel).await.unwrap();
        assert_eq!(handle.snapshot().phase, Phase::Cancelled);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.session_id, None);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_supersedes_slow_request() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_delayed(
            Duration::from_secs(10),
            Ok(ServerResponse::new("stale answer", Some("old"))),
        );
        mock.queue_response(ServerResponse::new("fresh answer", Some("new")));
        let store = Arc::new(MemoryStore::new());
        let handle = start(&mock, &store);

        handle
            .execute(Command::Send(UserInput::text("integrate sin x")))
            .await
            .unwrap();
        mock.request_started.notified().await;
        handle
            .execute(Command::Edit("integrate cos x".to_string()))
            .await
            .unwrap();

        let snapshot = wait_until(&handle, |s| s.messages.len() == 2).await;
        assert_eq!(snapshot.messages[0].content, "integrate cos x");
        assert_eq!(snapshot.messages[1].content, "fresh answer");

        tokio::time::sleep(Duration::from_secs(30)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.session_id.as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_and_empty_sends_rejected() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_delayed(Duration::from_secs(5), Ok(ServerResponse::new("ok", None)));
        let store = Arc::new(MemoryStore::new());
        let handle = start(&mock, &store);

        assert_eq!(
            handle.execute(Command::Send(UserInput::text(""))).await,
            Err(CommandError::Rejected(CoordinatorError::EmptyMessage))
        );

        handle
            .execute(Command::Send(UserInput::text("first")))
            .await
            .unwrap();
        assert_eq!(
            handle.execute(Command::Send(UserInput::text("second"))).await,
            Err(CommandError::Rejected(CoordinatorError::Busy))
        );
        assert_eq!(
            handle.execute(Command::Refresher(None)).await,
            Err(CommandError::Rejected(CoordinatorError::NoRefresherTopic))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_image_rejected_without_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.png");
        std::fs::write(&path, vec![0u8; crate::runtime::MAX_IMAGE_BYTES + 1]).unwrap();

        let mock = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryStore::new());
        let handle = start(&mock, &store);

        handle
            .execute(Command::SendImage {
                text: "what is this graph?".to_string(),
                path,
            })
            .await
            .unwrap();
        let snapshot = handle.snapshot();
        let error = snapshot.error.unwrap();
        assert!(error.message.contains("too large"));
        assert!(!error.retryable);
        assert!(snapshot.messages.is_empty());
        assert!(mock.recorded_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_upload_uses_long_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.png");
        std::fs::write(&path, b"png bytes").unwrap();

        let mock = Arc::new(MockTransport::new());
        mock.queue_response(ServerResponse::new("That is a parabola.", Some("s1")));
        let store = Arc::new(MemoryStore::new());
        let handle = start(&mock, &store);

        handle
            .execute(Command::SendImage {
                text: String::new(),
                path,
            })
            .await
            .unwrap();
        let snapshot = wait_until(&handle, |s| s.messages.len() == 2).await;
        assert_eq!(snapshot.messages[0].display, "[Image]");

        let call = &mock.recorded_calls()[0];
        assert_eq!(call.timeout, TimeoutPolicy::default().image_upload);
        assert_eq!(call.json()["image_type"], "image/png");
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failures_do_not_block() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_response(ServerResponse::new("2x", Some("s1")));
        let store = Arc::new(MemoryStore::new());
        store.fail_writes(true);
        let handle = start(&mock, &store);

        handle
            .execute(Command::Send(UserInput::text("derivative of x^2")))
            .await
            .unwrap();
        let snapshot = wait_until(&handle, |s| s.messages.len() == 2).await;
        assert_eq!(snapshot.session_id.as_deref(), Some("s1"));
        assert!(store.session("local-test").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_and_stuck_helpers() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_response(ServerResponse::new("Step 1: factor. Step 2: cancel.", Some("s1")));
        mock.queue_response(ServerResponse::new("In step 2 we cancel (x-1).", Some("s1")));
        let store = Arc::new(MemoryStore::new());
        let handle = start(&mock, &store);

        assert_eq!(
            handle.execute(Command::Stuck(Some(2))).await,
            Err(CommandError::Rejected(CoordinatorError::NoSolutionYet))
        );

        handle
            .execute(Command::Send(UserInput::text("Find the limit of (x^2-1)/(x-1) as x approaches 1")))
            .await
            .unwrap();
        wait_until(&handle, |s| s.messages.len() == 2).await;
        handle.execute(Command::Stuck(Some(2))).await.unwrap();
        wait_until(&handle, |s| s.messages.len() == 4).await;
        let body = mock.recorded_calls()[1].json();
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("I'm stuck on Step 2."));

        handle.execute(Command::NewSession).await.unwrap();
        let snapshot = handle.snapshot();
        assert!(snapshot.messages.is_empty());
        assert_eq!(snapshot.session_id, None);
        assert!(snapshot.progress.is_covered(Topic::Limits));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_stored_session() {
        let now = Utc::now();
        let mut older = SessionRecord::new("older", ConversationMode::Explain, now);
        older.updated_at = now - ChronoDuration::days(1);
        older.session_id = Some("s-old".to_string());
        older.transcript = std::iter::once(Message::user(
            "Explain the chain rule",
            ConversationMode::Explain,
            false,
            now,
        ))
        .collect();
        let newer = SessionRecord::new("newer", ConversationMode::Solve, now);

        let store = Arc::new(MemoryStore::new().with_session(older).with_session(newer));
        let mock = Arc::new(MockTransport::new());
        mock.queue_response(ServerResponse::new("Differentiate the outer function.", Some("s-old")));
        let handle = start(&mock, &store);

        let missing = handle
            .execute(Command::OpenSession("gone".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(missing, CommandError::SessionUnavailable(_)));

        handle
            .execute(Command::OpenSession("older".to_string()))
            .await
            .unwrap();
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.mode, ConversationMode::Explain);
        assert_eq!(snapshot.session_id.as_deref(), Some("s-old"));
        assert_eq!(snapshot.messages.len(), 1);

        handle
            .execute(Command::Send(UserInput::text("and with three functions?")))
            .await
            .unwrap();
        wait_until(&handle, |s| s.messages.len() == 3).await;
        assert_eq!(mock.recorded_calls()[0].json()["session_id"], "s-old");
        assert_eq!(store.session("older").unwrap().transcript.len(), 3);
        assert_eq!(store.session("newer").unwrap().transcript.len(), 0);
    }
}
