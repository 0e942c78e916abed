use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::errors::ChatError;
use crate::model::{Conversation, ConversationId, DEFAULT_CONVERSATION_TITLE};
use crate::notify::{Notification, Notifier, TracingNotifier};
use crate::session::ChatSession;
use crate::store::{ConversationStore, TranscriptStore};
use crate::transport::ChatTransport;

pub(crate) struct CompanionInner {
    pub(crate) transport: Arc<dyn ChatTransport>,
    pub(crate) transcripts: Arc<dyn TranscriptStore>,
    pub(crate) conversations: Arc<dyn ConversationStore>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) read_timeout: Option<Duration>,
}

/// Entry point that owns the collaborators and opens chat sessions.
#[derive(Clone)]
pub struct Companion {
    inner: Arc<CompanionInner>,
}

impl Companion {
    pub fn builder() -> CompanionBuilder {
        CompanionBuilder::default()
    }

    /// Opens a session on an existing conversation with an empty transcript.
    ///
    /// Call `ChatSession::load_messages` to fill it from the store.
    pub fn session(&self, conversation_id: ConversationId) -> ChatSession {
        ChatSession::new(self.inner.clone(), conversation_id)
    }

    /// Lists conversations, most recently updated first.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        self.inner.conversations.list().await
    }

    /// Creates an empty conversation and greets the user.
    pub async fn create_conversation(&self) -> Result<Conversation, ChatError> {
        match self
            .inner
            .conversations
            .create(DEFAULT_CONVERSATION_TITLE)
            .await
        {
            Ok(conversation) => {
                debug!(conversation_id = %conversation.id, "created conversation");
                self.inner.notifier.notify(Notification::info(
                    "New conversation started",
                    "How can I support you today?",
                ));
                Ok(conversation)
            }
            Err(err) => {
                error!(error = %err, "failed to create conversation");
                self.inner
                    .notifier
                    .notify(Notification::error("Failed to create new conversation"));
                Err(err)
            }
        }
    }

    /// Opens the most recent conversation with its transcript loaded,
    /// creating a conversation when there is none.
    pub async fn open_latest(&self) -> Result<ChatSession, ChatError> {
        let conversation = match self.list_conversations().await?.into_iter().next() {
            Some(conversation) => conversation,
            None => self.create_conversation().await?,
        };
        let mut session = self.session(conversation.id);
        session.load_messages().await?;
        Ok(session)
    }
}

/// Builder used to register collaborators before creating a `Companion`.
#[derive(Default)]
pub struct CompanionBuilder {
    transport: Option<Arc<dyn ChatTransport>>,
    transcripts: Option<Arc<dyn TranscriptStore>>,
    conversations: Option<Arc<dyn ConversationStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    read_timeout: Option<Duration>,
}

impl CompanionBuilder {
    pub fn transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn transcript_store(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.transcripts = Some(store);
        self
    }

    pub fn conversation_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(store);
        self
    }

    /// Registers one store for both transcripts and conversations.
    pub fn store<S>(self, store: Arc<S>) -> Self
    where
        S: TranscriptStore + ConversationStore + 'static,
    {
        self.transcript_store(store.clone()).conversation_store(store)
    }

    /// Replaces the default `TracingNotifier`.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Fails a turn when no reply data arrives within `timeout` of the previous read.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Companion, ChatError> {
        let transport = self
            .transport
            .ok_or_else(|| ChatError::Config("a chat transport is required".into()))?;
        let transcripts = self
            .transcripts
            .ok_or_else(|| ChatError::Config("a transcript store is required".into()))?;
        let conversations = self
            .conversations
            .ok_or_else(|| ChatError::Config("a conversation store is required".into()))?;
        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ChatError::Config("read_timeout must be greater than 0".into()));
        }
        Ok(Companion {
            inner: Arc::new(CompanionInner {
                transport,
                transcripts,
                conversations,
                notifier: self
                    .notifier
                    .unwrap_or_else(|| Arc::new(TracingNotifier)),
                read_timeout: self.read_timeout,
            }),
        })
    }
}
