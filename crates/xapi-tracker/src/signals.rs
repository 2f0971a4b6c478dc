//! Observable tracker signals
//!
//! Failures are never retried by the tracker; hosts that want to react
//! (notify the learner, retry later) subscribe here.

use crate::state::StateKey;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerSignal {
    Initialized,
    InitializeFailed {
        reason: String,
        /// Whether the host should tell the learner
        notify_learner: bool,
    },
    StatementSent {
        verb: String,
        object: String,
    },
    StatementFailed {
        verb: String,
        object: String,
        message: String,
    },
    StateLoaded,
    StateSent {
        key: StateKey,
    },
    StateFailed {
        key: StateKey,
        message: String,
    },
    StateCleared,
}

/// Broadcasts signals to any number of subscribers
#[derive(Debug, Clone)]
pub struct Signals {
    sender: broadcast::Sender<TrackerSignal>,
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}

impl Signals {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerSignal> {
        self.sender.subscribe()
    }

    /// Emit a signal; dropped when nobody listens
    pub fn emit(&self, signal: TrackerSignal) {
        let _ = self.sender.send(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_signals() {
        let signals = Signals::new();
        signals.emit(TrackerSignal::StateLoaded);

        let mut rx = signals.subscribe();
        signals.emit(TrackerSignal::StateSent { key: StateKey::Course });

        assert_eq!(rx.recv().await.unwrap(), TrackerSignal::StateSent { key: StateKey::Course });
        assert!(rx.try_recv().is_err());
    }
}
