//! Streaming reply reader and chat-turn reconciliation for the Healio companion.
//!
//! The core is [`StreamingTranscriptReader`], which turns an SSE-style
//! response body into cumulative reply snapshots. [`ChatSession`] wraps it in a
//! full turn: optimistic user message, persistence, live display and rollback
//! on failure. Network, storage and notifications are collaborator traits so
//! the whole flow runs against fakes in tests.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use healio_chat::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let companion = Companion::builder()
//!     .transport(Arc::new(HttpChatTransport::from_env()?))
//!     .store(Arc::new(InMemoryStore::new()))
//!     .build()?;
//!
//! let mut session = companion.open_latest().await?;
//! let mut print = |snapshot: &str| println!("{snapshot}");
//! let outcome = session.send_message("I had a rough day", &mut print).await?;
//! println!("final: {}", outcome.reply);
//! # Ok(())
//! # }
//! ```

/// Running assistant reply for one turn.
pub mod accumulator;
/// Companion entry point and builder.
pub mod companion;
/// Incremental UTF-8 decoding across chunk boundaries.
pub mod decode;
/// Public error type.
pub mod errors;
/// Stream line classification.
pub mod event;
/// Buffered line splitting.
pub mod lines;
/// Messages, records and conversation identifiers.
pub mod model;
/// Notifications and snapshot sinks.
pub mod notify;
/// Logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Byte stream to snapshot reader.
pub mod reader;
/// Chat session and turn handling.
pub mod session;
/// Transcript and conversation persistence.
pub mod store;
/// Outbound chat request transport.
pub mod transport;

pub use accumulator::ReplyAccumulator;
pub use companion::{Companion, CompanionBuilder};
pub use decode::Utf8ChunkDecoder;
pub use errors::ChatError;
pub use event::StreamEvent;
pub use lines::LineSplitter;
pub use model::{ChatMessage, Conversation, ConversationId, MessageRecord, Role};
pub use notify::{Notification, Notifier, NullSink, Severity, SnapshotSink, TracingNotifier};
pub use reader::{ByteStream, Completion, StreamingTranscriptReader};
pub use session::{AbortHandle, ChatSession, TurnOutcome};
pub use store::{ConversationStore, InMemoryStore, TranscriptStore};
pub use transport::{ChatClientConfig, ChatRequest, ChatTransport, HttpChatTransport};
