use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::ChatError;
use crate::model::{Conversation, ConversationId, MessageRecord};

use super::{ConversationStore, TranscriptStore};

/// Process-local store backing both collaborator traits.
///
/// A known conversation's `updated_at` tracks its newest remaining message,
/// or its creation time when it has none.
#[derive(Default)]
pub struct InMemoryStore {
    messages: RwLock<Vec<MessageRecord>>,
    conversations: RwLock<HashMap<ConversationId, StoredConversation>>,
}

struct StoredConversation {
    conversation: Conversation,
    created_at: DateTime<Utc>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted messages across all conversations.
    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }
}

#[async_trait::async_trait]
impl TranscriptStore for InMemoryStore {
    async fn append(&self, record: MessageRecord) -> Result<(), ChatError> {
        if let Some(stored) = self
            .conversations
            .write()
            .await
            .get_mut(&record.conversation_id)
        {
            stored.conversation.updated_at = stored.conversation.updated_at.max(record.created_at);
        }
        self.messages.write().await.push(record);
        Ok(())
    }

    async fn load(&self, conversation_id: ConversationId) -> Result<Vec<MessageRecord>, ChatError> {
        let mut records: Vec<MessageRecord> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|r| r.conversation_id == conversation_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn delete(&self, record_id: uuid::Uuid) -> Result<(), ChatError> {
        let mut messages = self.messages.write().await;
        let Some(index) = messages.iter().position(|r| r.id == record_id) else {
            return Err(ChatError::persistence(format!("message {record_id} not found")));
        };
        let removed = messages.remove(index);

        if let Some(stored) = self
            .conversations
            .write()
            .await
            .get_mut(&removed.conversation_id)
        {
            stored.conversation.updated_at = messages
                .iter()
                .filter(|r| r.conversation_id == removed.conversation_id)
                .map(|r| r.created_at)
                .fold(stored.created_at, |latest, at| latest.max(at));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryStore {
    async fn list(&self) -> Result<Vec<Conversation>, ChatError> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .read()
            .await
            .values()
            .map(|stored| stored.conversation.clone())
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn create(&self, title: &str) -> Result<Conversation, ChatError> {
        let created_at = Utc::now();
        let conversation = Conversation {
            id: ConversationId::new(),
            title: title.to_string(),
            updated_at: created_at,
        };
        self.conversations.write().await.insert(
            conversation.id,
            StoredConversation {
                conversation: conversation.clone(),
                created_at,
            },
        );
        Ok(conversation)
    }
}
