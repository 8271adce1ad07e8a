//! Progress events emitted while walking a tree

use std::path::PathBuf;
use tokio::sync::mpsc;

/// Progress event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    /// A directory listing started
    DirectoryEntered(PathBuf),
    /// A file was compared against its remote counterpart
    FileChecked(PathBuf),
    /// A file was transferred
    FileUploaded(PathBuf),
    /// An entry failed and was skipped
    EntryFailed(PathBuf),
}

/// Fire-and-forget sender for [`WalkEvent`]s
///
/// A reporter without a receiver drops events silently, so the walker
/// never blocks on a slow or absent consumer.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    event_tx: Option<mpsc::UnboundedSender<WalkEvent>>,
}

impl ProgressReporter {
    /// Create a reporter and the receiver consuming its events
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WalkEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                event_tx: Some(event_tx),
            },
            event_rx,
        )
    }

    /// Reporter that discards everything
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Send an event if anyone is listening
    pub fn emit(&self, event: WalkEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_receiver() {
        let (reporter, mut rx) = ProgressReporter::channel();
        reporter.emit(WalkEvent::FileChecked(PathBuf::from("a.txt")));
        drop(reporter);

        assert_eq!(
            rx.recv().await,
            Some(WalkEvent::FileChecked(PathBuf::from("a.txt")))
        );
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_disabled_reporter_drops_events() {
        ProgressReporter::disabled().emit(WalkEvent::DirectoryEntered(PathBuf::from(".")));
    }
}
