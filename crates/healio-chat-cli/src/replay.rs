use std::path::Path;

use anyhow::Context as _;
use healio_chat::{ByteStream, ChatError, Completion, SnapshotSink, StreamingTranscriptReader};

use crate::output::{SnapshotPrinter, SuffixPrinter};

/// Splits a captured body into fixed-size reads.
fn chunked(body: Vec<u8>, chunk_size: usize) -> ByteStream {
    let chunks: Vec<Result<bytes::Bytes, ChatError>> = body
        .chunks(chunk_size)
        .map(|chunk| Ok(bytes::Bytes::copy_from_slice(chunk)))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

/// Drives a reader over `body`, forwarding each snapshot to `sink`.
pub async fn replay_body(
    body: Vec<u8>,
    chunk_size: usize,
    sink: &mut dyn SnapshotSink,
) -> anyhow::Result<(String, Option<Completion>)> {
    anyhow::ensure!(chunk_size > 0, "chunk size must be greater than 0");
    let mut reader = StreamingTranscriptReader::new(chunked(body, chunk_size));
    while let Some(snapshot) = reader.next_snapshot().await {
        sink.on_snapshot(&snapshot?);
    }
    let completion = reader.completion();
    Ok((reader.into_reply(), completion))
}

pub async fn run(file: &Path, chunk_size: usize, snapshots: bool) -> anyhow::Result<()> {
    let body = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    tracing::debug!(file = %file.display(), bytes = body.len(), chunk_size, "replaying capture");

    let (_, completion) = if snapshots {
        replay_body(body, chunk_size, &mut SnapshotPrinter::new(std::io::stdout())).await?
    } else {
        let result = replay_body(body, chunk_size, &mut SuffixPrinter::new(std::io::stdout())).await?;
        println!();
        result
    };
    match completion {
        Some(Completion::Terminated) => eprintln!("-- stream terminated by [DONE]"),
        Some(Completion::Exhausted) => eprintln!("-- stream ended without [DONE]"),
        None => eprintln!("-- stream did not finish"),
    }
    Ok(())
}
