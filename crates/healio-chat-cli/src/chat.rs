use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use healio_chat::{ChatSession, Companion, HttpChatTransport, InMemoryStore};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _};

use crate::output::{StderrNotifier, SuffixPrinter};

pub async fn run(timeout_secs: u64) -> anyhow::Result<()> {
    let companion = Companion::builder()
        .transport(Arc::new(HttpChatTransport::from_env()?))
        .store(Arc::new(InMemoryStore::new()))
        .notifier(Arc::new(StderrNotifier))
        .read_timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()?;
    let mut session = companion.open_latest().await?;
    tracing::info!(conversation_id = %session.conversation_id(), "chat session ready");
    eprintln!("I'm here to listen and support you. Share what's on your mind (Ctrl-D to quit).");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let turns = converse(&mut session, stdin, &mut std::io::stdout()).await?;
    tracing::debug!(turns, "chat input closed");
    Ok(())
}

/// Sends every non-blank input line as one turn and returns how many were
/// attempted.
///
/// A failed turn is already reported through the notifier and rolled back,
/// so the loop moves on and the user can resend.
async fn converse<R, W>(session: &mut ChatSession, input: R, out: &mut W) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write + Send,
{
    let mut lines = input.lines();
    let mut turns = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        turns += 1;
        let mut printer = SuffixPrinter::new(&mut *out);
        if let Err(err) = session.send_message(&line, &mut printer).await {
            if err.is_network() {
                tracing::debug!(error = %err, "turn failed on the network side");
            } else {
                tracing::warn!(error = %err, "turn failed");
            }
        }
        writeln!(out)?;
    }
    Ok(turns)
}
