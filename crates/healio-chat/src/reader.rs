use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use tracing::{debug, warn};

use crate::accumulator::ReplyAccumulator;
use crate::decode::Utf8ChunkDecoder;
use crate::errors::ChatError;
use crate::event::StreamEvent;
use crate::lines::LineSplitter;

/// Raw response body: opaque chunks until exhausted.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, ChatError>> + Send + 'static>>;

/// How a reader reached the end of its turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The stream sent `data: [DONE]`.
    Terminated,
    /// The byte source ended without a sentinel.
    Exhausted,
}

/// Turns one response body into a sequence of cumulative reply snapshots.
///
/// A reader serves exactly one turn. The byte source is dropped as soon as the
/// turn ends (sentinel, exhaustion or read failure), and dropping the reader
/// releases it on any other path.
pub struct StreamingTranscriptReader {
    source: Option<ByteStream>,
    decoder: Utf8ChunkDecoder,
    lines: LineSplitter,
    reply: ReplyAccumulator,
    pending: VecDeque<String>,
    completion: Option<Completion>,
}

impl StreamingTranscriptReader {
    pub fn new(source: ByteStream) -> Self {
        Self {
            source: Some(source),
            decoder: Utf8ChunkDecoder::new(),
            lines: LineSplitter::new(),
            reply: ReplyAccumulator::new(),
            pending: VecDeque::new(),
            completion: None,
        }
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` once the turn has ended. A read failure is returned once
    /// as `Err(ChatError::StreamRead)`; the reader is finished afterwards.
    pub async fn next_snapshot(&mut self) -> Option<Result<String, ChatError>> {
        loop {
            if let Some(snapshot) = self.pending.pop_front() {
                return Some(Ok(snapshot));
            }
            let source = self.source.as_mut()?;
            let next = source.next().await;
            match next {
                Some(Ok(chunk)) => {
                    let text = self.decoder.decode(&chunk);
                    self.process_text(&text);
                }
                Some(Err(err)) => {
                    warn!(error = %err, fragments = self.reply.fragments(), "response stream read failed");
                    self.source = None;
                    return Some(Err(err));
                }
                None => {
                    let tail = self.decoder.finish();
                    self.process_text(&tail);
                    if let Some(last) = self.lines.take_remainder()
                        && self.completion.is_none()
                    {
                        self.process_line(&last);
                    }
                    if self.completion.is_none() {
                        debug!(fragments = self.reply.fragments(), "response stream exhausted without sentinel");
                        self.end(Completion::Exhausted);
                    }
                }
            }
        }
    }

    /// Adapts the reader into a `futures::Stream` of snapshots.
    pub fn into_stream(self) -> impl futures::Stream<Item = Result<String, ChatError>> + Send {
        futures::stream::unfold(self, |mut reader| async move {
            reader
                .next_snapshot()
                .await
                .map(|snapshot| (snapshot, reader))
        })
    }

    /// `None` while the turn is still running or after a read failure.
    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    pub fn into_reply(self) -> String {
        self.reply.into_content()
    }

    fn process_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        for line in self.lines.feed(text) {
            if self.completion.is_some() {
                break;
            }
            self.process_line(&line);
        }
    }

    fn process_line(&mut self, line: &str) {
        match StreamEvent::parse_line(line) {
            StreamEvent::Delta { text } => {
                let seq = self.reply.fragments();
                debug!(seq, len = text.len(), "reply delta");
                let snapshot = self.reply.append_fragment(&text).to_string();
                self.pending.push_back(snapshot);
            }
            StreamEvent::Terminal => {
                debug!(fragments = self.reply.fragments(), "response stream terminated");
                self.end(Completion::Terminated);
            }
            StreamEvent::Malformed { reason } => {
                debug!(%reason, "skipping malformed stream line");
            }
            StreamEvent::CommentOrBlank | StreamEvent::Ignored => {}
        }
    }

    fn end(&mut self, completion: Completion) {
        self.completion = Some(completion);
        self.source = None;
        let _ = self.lines.take_remainder();
    }
}
