//! Common imports for typical companion usage.
pub use crate::{
    AbortHandle, ChatError, ChatMessage, ChatSession, Companion, CompanionBuilder, Completion,
    ConversationId, HttpChatTransport, InMemoryStore, Role, SnapshotSink, StreamingTranscriptReader,
    TurnOutcome,
};
