use tracing::{error, info};

/// Severity of a user-facing notification.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

/// Non-blocking message shown to the user (a toast in a UI).
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Info,
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            description: description.into(),
            severity: Severity::Error,
        }
    }
}

/// Delivers notifications to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier that only logs; the default when none is registered.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Info => info!(title = %notification.title, "{}", notification.description),
            Severity::Error => error!(title = %notification.title, "{}", notification.description),
        }
    }
}

/// Receives every reply snapshot for live display.
///
/// Called once per content fragment, so implementations must be cheap.
pub trait SnapshotSink: Send {
    fn on_snapshot(&mut self, snapshot: &str);
}

impl<F> SnapshotSink for F
where
    F: FnMut(&str) + Send,
{
    fn on_snapshot(&mut self, snapshot: &str) {
        self(snapshot)
    }
}

/// Sink that discards snapshots.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl SnapshotSink for NullSink {
    fn on_snapshot(&mut self, _snapshot: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |s: &str| seen.push(s.to_string());
            sink.on_snapshot("a");
            sink.on_snapshot("ab");
        }
        assert_eq!(seen, vec!["a", "ab"]);
    }

    #[test]
    fn error_notifications_use_error_title() {
        let n = Notification::error("Failed to load messages");
        assert_eq!(n.title, "Error");
        assert_eq!(n.severity, Severity::Error);
    }
}
