use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::companion::CompanionInner;
use crate::errors::ChatError;
use crate::model::{ChatMessage, ConversationId, MessageRecord, Role};
use crate::notify::{Notification, SnapshotSink};
use crate::reader::{Completion, StreamingTranscriptReader};
use crate::transport::ChatRequest;

/// Handle used to cancel the turn currently streaming in a session.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation of the in-flight turn.
    ///
    /// The turn ends with `ChatError::Cancelled` and is rolled back. Has no
    /// effect on a turn started after the call.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Result of a completed turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Final assistant content.
    pub reply: String,
    pub completion: Completion,
    /// Whether the assistant reply reached the transcript store.
    pub persisted: bool,
}

/// Visible transcript of one conversation and the turns sent through it.
pub struct ChatSession {
    inner: Arc<CompanionInner>,
    conversation_id: ConversationId,
    messages: Vec<ChatMessage>,
    abort_tx: watch::Sender<bool>,
}

impl ChatSession {
    pub(crate) fn new(inner: Arc<CompanionInner>, conversation_id: ConversationId) -> Self {
        let (abort_tx, _) = watch::channel(false);
        Self {
            inner,
            conversation_id,
            messages: Vec::new(),
            abort_tx,
        }
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Messages currently on display, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    /// Replaces the visible transcript with the stored one.
    pub async fn load_messages(&mut self) -> Result<(), ChatError> {
        match self.inner.transcripts.load(self.conversation_id).await {
            Ok(records) => {
                self.messages = records.iter().map(MessageRecord::to_message).collect();
                debug!(conversation_id = %self.conversation_id, count = self.messages.len(), "loaded transcript");
                Ok(())
            }
            Err(err) => {
                error!(conversation_id = %self.conversation_id, error = %err, "failed to load transcript");
                self.inner
                    .notifier
                    .notify(Notification::error("Failed to load messages"));
                Err(err)
            }
        }
    }

    /// Sends one user message and streams the assistant reply into the transcript.
    ///
    /// Every snapshot is mirrored into the last transcript entry and handed to
    /// `sink`. If the turn fails, the transcript is restored to what it was
    /// before the call and a persisted user message is deleted again.
    pub async fn send_message(
        &mut self,
        content: &str,
        sink: &mut dyn SnapshotSink,
    ) -> Result<TurnOutcome, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::Validation("message must not be empty".into()));
        }

        self.abort_tx.send_replace(false);
        let mut abort_rx = self.abort_tx.subscribe();
        let checkpoint = self.messages.len();
        let mut persisted_user = None;

        let result = self
            .run_turn(content, sink, &mut abort_rx, &mut persisted_user)
            .await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.rollback(checkpoint, persisted_user, &err).await;
                Err(err)
            }
        }
    }

    async fn run_turn(
        &mut self,
        content: &str,
        sink: &mut dyn SnapshotSink,
        abort_rx: &mut watch::Receiver<bool>,
        persisted_user: &mut Option<uuid::Uuid>,
    ) -> Result<TurnOutcome, ChatError> {
        let conversation_id = self.conversation_id;
        self.messages.push(ChatMessage::user(content));

        let user_record = MessageRecord::new(conversation_id, Role::User, content);
        let user_record_id = user_record.id;
        until_aborted(abort_rx, self.inner.transcripts.append(user_record)).await?;
        *persisted_user = Some(user_record_id);

        let request = ChatRequest {
            messages: self.messages.clone(),
        };
        let body = until_aborted(abort_rx, self.inner.transport.start_stream(request)).await?;
        let mut reader = StreamingTranscriptReader::new(body);
        self.messages.push(ChatMessage::assistant(String::new()));

        let read_timeout = self.inner.read_timeout;
        loop {
            let next = until_aborted(abort_rx, async {
                Ok(next_snapshot(&mut reader, read_timeout).await)
            })
            .await?;
            match next {
                Some(Ok(snapshot)) => {
                    if let Some(last) = self.messages.last_mut() {
                        last.content.clone_from(&snapshot);
                    }
                    sink.on_snapshot(&snapshot);
                }
                Some(Err(err)) => return Err(err),
                None => break,
            }
        }

        let completion = reader.completion().unwrap_or(Completion::Exhausted);
        let reply = reader.into_reply();
        debug!(%conversation_id, ?completion, len = reply.len(), "assistant reply finished");

        if reply.is_empty() {
            // nothing to keep; the empty placeholder would not survive a reload
            self.messages.pop();
            return Ok(TurnOutcome {
                reply,
                completion,
                persisted: false,
            });
        }

        let record = MessageRecord::new(conversation_id, Role::Assistant, reply.clone());
        let persisted = match self.inner.transcripts.append(record).await {
            Ok(()) => true,
            Err(err) => {
                error!(%conversation_id, error = %err, "failed to persist assistant reply");
                self.inner
                    .notifier
                    .notify(Notification::error(err.user_message()));
                false
            }
        };
        Ok(TurnOutcome {
            reply,
            completion,
            persisted,
        })
    }

    async fn rollback(
        &mut self,
        checkpoint: usize,
        persisted_user: Option<uuid::Uuid>,
        err: &ChatError,
    ) {
        warn!(conversation_id = %self.conversation_id, error = %err, "chat turn failed; rolling back");
        self.messages.truncate(checkpoint);
        if let Some(record_id) = persisted_user
            && let Err(delete_err) = self.inner.transcripts.delete(record_id).await
        {
            error!(conversation_id = %self.conversation_id, %record_id, error = %delete_err, "failed to remove user message of failed turn");
        }
        if !matches!(err, ChatError::Cancelled) {
            self.inner
                .notifier
                .notify(Notification::error(err.user_message()));
        }
    }
}

/// Drives `fut` to completion unless the session is aborted first.
async fn until_aborted<T, F>(abort_rx: &mut watch::Receiver<bool>, fut: F) -> Result<T, ChatError>
where
    F: Future<Output = Result<T, ChatError>>,
{
    tokio::pin!(fut);
    let mut abort_live = true;
    loop {
        tokio::select! {
            biased;
            changed = abort_rx.changed(), if abort_live => match changed {
                Ok(()) if *abort_rx.borrow() => return Err(ChatError::Cancelled),
                Ok(()) => {}
                Err(_) => abort_live = false,
            },
            result = &mut fut => return result,
        }
    }
}

async fn next_snapshot(
    reader: &mut StreamingTranscriptReader,
    read_timeout: Option<Duration>,
) -> Option<Result<String, ChatError>> {
    match read_timeout {
        Some(limit) => match tokio::time::timeout(limit, reader.next_snapshot()).await {
            Ok(next) => next,
            Err(_) => Some(Err(ChatError::stream_read(format!(
                "no reply data within {limit:?}"
            )))),
        },
        None => reader.next_snapshot().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Notifier, Severity};
    use crate::reader::ByteStream;
    use crate::store::{InMemoryStore, TranscriptStore};
    use crate::transport::ChatTransport;
    use crate::Companion;
    use futures::stream;
    use std::sync::Mutex;

    enum FakeBody {
        ImmediateError(ChatError),
        Chunks(Vec<Result<&'static str, ChatError>>),
        Pending,
        NeverResponds,
    }

    struct FakeTransport {
        body: FakeBody,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl FakeTransport {
        fn new(body: FakeBody) -> Arc<Self> {
            Arc::new(Self {
                body,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    #[async_trait::async_trait]
    impl ChatTransport for FakeTransport {
        async fn start_stream(&self, request: ChatRequest) -> Result<ByteStream, ChatError> {
            self.requests.lock().expect("lock").push(request);
            match &self.body {
                FakeBody::ImmediateError(err) => Err(err.clone()),
                FakeBody::Chunks(chunks) => {
                    let items: Vec<_> = chunks
                        .iter()
                        .map(|c| c.clone().map(|s| bytes::Bytes::from_static(s.as_bytes())))
                        .collect();
                    Ok(Box::pin(stream::iter(items)))
                }
                FakeBody::Pending => Ok(Box::pin(stream::pending::<Result<bytes::Bytes, ChatError>>())),
                FakeBody::NeverResponds => std::future::pending().await,
            }
        }
    }

    /// In-memory store that can be told to reject one role on append.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryStore,
        reject_role: Option<Role>,
        reject_load: bool,
        stall_append: bool,
    }

    #[async_trait::async_trait]
    impl TranscriptStore for FlakyStore {
        async fn append(&self, record: MessageRecord) -> Result<(), ChatError> {
            if self.reject_role == Some(record.role) {
                return Err(ChatError::persistence("insert rejected"));
            }
            if self.stall_append {
                std::future::pending::<()>().await;
            }
            self.inner.append(record).await
        }

        async fn load(
            &self,
            conversation_id: ConversationId,
        ) -> Result<Vec<MessageRecord>, ChatError> {
            if self.reject_load {
                return Err(ChatError::persistence("select rejected"));
            }
            self.inner.load(conversation_id).await
        }

        async fn delete(&self, record_id: uuid::Uuid) -> Result<(), ChatError> {
            self.inner.delete(record_id).await
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<Notification>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.seen.lock().expect("lock").push(notification);
        }
    }

    impl RecordingNotifier {
        fn seen(&self) -> Vec<Notification> {
            self.seen.lock().expect("lock").clone()
        }
    }

    const DELTA_A: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n";
    const DELTA_B: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n";
    const PARTIAL: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Partial answ\"}}]}\n";

    struct Fixture {
        session: ChatSession,
        transport: Arc<FakeTransport>,
        store: Arc<FlakyStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture_with(body: FakeBody, store: FlakyStore, read_timeout: Option<Duration>) -> Fixture {
        let transport = FakeTransport::new(body);
        let store = Arc::new(store);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut builder = Companion::builder()
            .transport(transport.clone())
            .transcript_store(store.clone())
            .conversation_store(Arc::new(InMemoryStore::new()))
            .notifier(notifier.clone());
        if let Some(limit) = read_timeout {
            builder = builder.read_timeout(limit);
        }
        let companion = builder.build().expect("companion");
        Fixture {
            session: companion.session(ConversationId::new()),
            transport,
            store,
            notifier,
        }
    }

    fn fixture(body: FakeBody) -> Fixture {
        fixture_with(body, FlakyStore::default(), None)
    }

    async fn stored(store: &FlakyStore, id: ConversationId) -> Vec<ChatMessage> {
        store
            .inner
            .load(id)
            .await
            .expect("load")
            .iter()
            .map(MessageRecord::to_message)
            .collect()
    }

    #[tokio::test]
    async fn successful_turn_streams_and_persists_both_sides() {
        let mut fx = fixture(FakeBody::Chunks(vec![
            Ok(DELTA_A),
            Ok(DELTA_B),
            Ok("data: [DONE]\n"),
        ]));
        let mut snapshots = Vec::new();
        let mut sink = |s: &str| snapshots.push(s.to_string());

        let outcome = fx
            .session
            .send_message("  I feel anxious  ", &mut sink)
            .await
            .expect("turn");

        assert_eq!(snapshots, vec!["A", "AB"]);
        assert_eq!(outcome.reply, "AB");
        assert_eq!(outcome.completion, Completion::Terminated);
        assert!(outcome.persisted);
        let expected = vec![ChatMessage::user("I feel anxious"), ChatMessage::assistant("AB")];
        assert_eq!(fx.session.messages(), expected.as_slice());
        assert_eq!(stored(&fx.store, fx.session.conversation_id()).await, expected);
        assert_eq!(
            fx.transport.requests(),
            vec![ChatRequest {
                messages: vec![ChatMessage::user("I feel anxious")]
            }]
        );
        assert!(fx.notifier.seen().is_empty());
    }

    #[tokio::test]
    async fn history_is_sent_with_the_new_message() {
        let mut fx = fixture(FakeBody::Chunks(vec![Ok(DELTA_A)]));
        let mut sink = crate::notify::NullSink;
        fx.session.send_message("first", &mut sink).await.expect("turn 1");
        fx.session.send_message("second", &mut sink).await.expect("turn 2");

        let requests = fx.transport.requests();
        assert_eq!(
            requests[1].messages,
            vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("A"),
                ChatMessage::user("second"),
            ]
        );
    }

    #[tokio::test]
    async fn read_failure_discards_partial_reply_and_user_message() {
        let mut fx = fixture(FakeBody::Chunks(vec![
            Ok(PARTIAL),
            Err(ChatError::stream_read("connection reset")),
        ]));
        let mut snapshots = Vec::new();
        let mut sink = |s: &str| snapshots.push(s.to_string());

        let err = fx
            .session
            .send_message("hello", &mut sink)
            .await
            .expect_err("turn should fail");

        assert_eq!(err, ChatError::stream_read("connection reset"));
        assert_eq!(snapshots, vec!["Partial answ"]);
        assert!(fx.session.messages().is_empty());
        assert!(stored(&fx.store, fx.session.conversation_id()).await.is_empty());
        let seen = fx.notifier.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].severity, Severity::Error);
        assert_eq!(seen[0].description, "connection reset");
    }

    #[tokio::test]
    async fn failed_turn_keeps_earlier_turns() {
        let store = FlakyStore::default();
        let conversation_id = ConversationId::new();
        store
            .inner
            .append(MessageRecord::new(conversation_id, Role::User, "earlier"))
            .await
            .expect("seed");
        store
            .inner
            .append(MessageRecord::new(conversation_id, Role::Assistant, "reply"))
            .await
            .expect("seed");
        let transport = FakeTransport::new(FakeBody::ImmediateError(ChatError::transport(
            "Rate limits exceeded",
            Some(429),
        )));
        let store = Arc::new(store);
        let companion = Companion::builder()
            .transport(transport)
            .transcript_store(store.clone())
            .conversation_store(Arc::new(InMemoryStore::new()))
            .build()
            .expect("companion");
        let mut session = companion.session(conversation_id);
        session.load_messages().await.expect("load");

        let err = session
            .send_message("again", &mut crate::notify::NullSink)
            .await
            .expect_err("transport fails");

        assert!(matches!(err, ChatError::Transport { status_code: Some(429), .. }));
        let expected = vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")];
        assert_eq!(session.messages(), expected.as_slice());
        assert_eq!(stored(&store, conversation_id).await, expected);
    }

    #[tokio::test]
    async fn user_persist_failure_never_calls_transport() {
        let store = FlakyStore {
            reject_role: Some(Role::User),
            ..FlakyStore::default()
        };
        let mut fx = fixture_with(FakeBody::Chunks(vec![Ok(DELTA_A)]), store, None);

        let err = fx
            .session
            .send_message("hello", &mut crate::notify::NullSink)
            .await
            .expect_err("persist fails");

        assert!(matches!(err, ChatError::Persistence(_)));
        assert!(fx.session.messages().is_empty());
        assert!(fx.transport.requests().is_empty());
        assert_eq!(fx.notifier.seen().len(), 1);
    }

    #[tokio::test]
    async fn assistant_persist_failure_keeps_displayed_reply() {
        let store = FlakyStore {
            reject_role: Some(Role::Assistant),
            ..FlakyStore::default()
        };
        let mut fx = fixture_with(FakeBody::Chunks(vec![Ok(DELTA_A)]), store, None);

        let outcome = fx
            .session
            .send_message("hello", &mut crate::notify::NullSink)
            .await
            .expect("turn succeeds");

        assert!(!outcome.persisted);
        assert_eq!(outcome.completion, Completion::Exhausted);
        assert_eq!(
            fx.session.messages(),
            &[ChatMessage::user("hello"), ChatMessage::assistant("A")]
        );
        let seen = fx.notifier.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].description, "insert rejected");
    }

    #[tokio::test]
    async fn empty_reply_is_not_persisted() {
        let mut fx = fixture(FakeBody::Chunks(vec![Ok(": ping\n"), Ok("data: [DONE]\n")]));

        let outcome = fx
            .session
            .send_message("hello", &mut crate::notify::NullSink)
            .await
            .expect("turn");

        assert_eq!(outcome.reply, "");
        assert!(!outcome.persisted);
        assert_eq!(fx.session.messages(), &[ChatMessage::user("hello")]);
        assert_eq!(fx.store.inner.message_count().await, 1);
    }

    #[tokio::test]
    async fn blank_message_is_rejected_without_side_effects() {
        let mut fx = fixture(FakeBody::Chunks(vec![]));
        let err = fx
            .session
            .send_message("   ", &mut crate::notify::NullSink)
            .await
            .expect_err("blank");
        assert!(matches!(err, ChatError::Validation(_)));
        assert!(fx.transport.requests().is_empty());
        assert!(fx.notifier.seen().is_empty());
    }

    #[tokio::test]
    async fn read_timeout_fails_and_rolls_back() {
        let mut fx = fixture_with(
            FakeBody::Pending,
            FlakyStore::default(),
            Some(Duration::from_millis(20)),
        );

        let err = fx
            .session
            .send_message("hello", &mut crate::notify::NullSink)
            .await
            .expect_err("timeout");

        assert!(matches!(err, ChatError::StreamRead { .. }));
        assert!(fx.session.messages().is_empty());
        assert_eq!(fx.store.inner.message_count().await, 0);
    }

    #[tokio::test]
    async fn abort_cancels_in_flight_turn() {
        let mut fx = fixture(FakeBody::Pending);
        let abort = fx.session.abort_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            abort.abort();
        });

        let err = fx
            .session
            .send_message("hello", &mut crate::notify::NullSink)
            .await
            .expect_err("cancelled");

        assert_eq!(err, ChatError::Cancelled);
        assert!(fx.session.messages().is_empty());
        assert_eq!(fx.store.inner.message_count().await, 0);
        assert!(fx.notifier.seen().is_empty());
    }

    async fn send_then_abort(fx: &mut Fixture) -> Result<TurnOutcome, ChatError> {
        let abort = fx.session.abort_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            abort.abort();
        });
        tokio::time::timeout(
            Duration::from_secs(2),
            fx.session.send_message("hello", &mut crate::notify::NullSink),
        )
        .await
        .expect("abort releases the turn")
    }

    #[tokio::test]
    async fn abort_releases_turn_waiting_for_response_headers() {
        let mut fx = fixture(FakeBody::NeverResponds);

        let err = send_then_abort(&mut fx).await.expect_err("cancelled");

        assert_eq!(err, ChatError::Cancelled);
        assert_eq!(fx.transport.requests().len(), 1);
        assert!(fx.session.messages().is_empty());
        assert_eq!(fx.store.inner.message_count().await, 0);
        assert!(fx.notifier.seen().is_empty());
    }

    #[tokio::test]
    async fn abort_releases_turn_waiting_on_the_store() {
        let store = FlakyStore {
            stall_append: true,
            ..FlakyStore::default()
        };
        let mut fx = fixture_with(FakeBody::Chunks(vec![Ok(DELTA_A)]), store, None);

        let err = send_then_abort(&mut fx).await.expect_err("cancelled");

        assert_eq!(err, ChatError::Cancelled);
        assert!(fx.transport.requests().is_empty());
        assert!(fx.session.messages().is_empty());
    }

    #[tokio::test]
    async fn abort_before_a_turn_does_not_cancel_it() {
        let mut fx = fixture(FakeBody::Chunks(vec![Ok(DELTA_A)]));
        fx.session.abort_handle().abort();
        let outcome = fx
            .session
            .send_message("hello", &mut crate::notify::NullSink)
            .await
            .expect("turn");
        assert_eq!(outcome.reply, "A");
    }

    #[tokio::test]
    async fn load_failure_notifies_and_keeps_transcript() {
        let store = FlakyStore {
            reject_load: true,
            ..FlakyStore::default()
        };
        let mut fx = fixture_with(FakeBody::Chunks(vec![]), store, None);
        let err = fx.session.load_messages().await.expect_err("load fails");
        assert!(matches!(err, ChatError::Persistence(_)));
        assert_eq!(fx.notifier.seen()[0].description, "Failed to load messages");
    }

    #[tokio::test]
    async fn snapshot_stream_matches_transcript_tail() {
        let mut fx = fixture(FakeBody::Chunks(vec![Ok(DELTA_A), Ok(DELTA_B)]));
        let mut last = String::new();
        let mut sink = |s: &str| last = s.to_string();
        fx.session.send_message("hi", &mut sink).await.expect("turn");
        assert_eq!(
            fx.session.messages().last().map(|m| m.content.as_str()),
            Some(last.as_str())
        );
    }
}
