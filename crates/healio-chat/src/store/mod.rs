//! Persistence collaborators for transcripts and conversations.
mod memory;

pub use memory::InMemoryStore;

use crate::errors::ChatError;
use crate::model::{Conversation, ConversationId, MessageRecord};

/// Append-only transcript persistence.
#[async_trait::async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Persists one message. Called once per side of a turn, never mid-stream.
    async fn append(&self, record: MessageRecord) -> Result<(), ChatError>;

    /// Loads a conversation's messages ordered by `created_at` ascending.
    async fn load(&self, conversation_id: ConversationId) -> Result<Vec<MessageRecord>, ChatError>;

    /// Removes a previously appended record. Used only to undo a failed turn.
    async fn delete(&self, record_id: uuid::Uuid) -> Result<(), ChatError>;
}

/// Conversation listing and creation.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    /// Lists conversations, most recently updated first.
    async fn list(&self) -> Result<Vec<Conversation>, ChatError>;

    async fn create(&self, title: &str) -> Result<Conversation, ChatError>;
}
