use std::io::Write as _;

use healio_chat::{Notification, Notifier, Severity, SnapshotSink};

/// Prints only the part of each snapshot not yet shown, so the reply appears
/// to type itself out.
pub struct SuffixPrinter<W: std::io::Write + Send> {
    out: W,
    shown: usize,
}

impl<W: std::io::Write + Send> SuffixPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out, shown: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: std::io::Write + Send> SnapshotSink for SuffixPrinter<W> {
    fn on_snapshot(&mut self, snapshot: &str) {
        // snapshots only grow, so the previous length is a char boundary
        if let Some(new_text) = snapshot.get(self.shown..) {
            let _ = self.out.write_all(new_text.as_bytes());
            let _ = self.out.flush();
        }
        self.shown = snapshot.len();
    }
}

/// Prints each snapshot on its own line.
pub struct SnapshotPrinter<W: std::io::Write + Send> {
    out: W,
}

impl<W: std::io::Write + Send> SnapshotPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: std::io::Write + Send> SnapshotSink for SnapshotPrinter<W> {
    fn on_snapshot(&mut self, snapshot: &str) {
        let _ = writeln!(self.out, "{snapshot}");
    }
}

/// Shows notifications on stderr.
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notification: Notification) {
        let marker = match notification.severity {
            Severity::Info => "i",
            Severity::Error => "!",
        };
        eprintln!(
            "[{marker}] {}: {}",
            notification.title, notification.description
        );
    }
}
