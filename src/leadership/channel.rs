use tokio::sync::mpsc;

use crate::leadership::LeaderLatchListener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadershipEvent {
    Promoted,
    Demoted,
}

impl std::fmt::Display for LeadershipEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadershipEvent::Promoted => write!(f, "promoted"),
            LeadershipEvent::Demoted => write!(f, "demoted"),
        }
    }
}

/// Listener that queues leadership callbacks for a single consumer.
///
/// Callbacks never block, so the coordination service's thread is released
/// immediately; the consumer applies events in arrival order.
#[derive(Debug, Clone)]
pub struct LeadershipChannel {
    tx: mpsc::UnboundedSender<LeadershipEvent>,
}

impl LeadershipChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LeadershipEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: LeadershipEvent) {
        if self.tx.send(event).is_err() {
            // Consumer gone: the scheduler was deactivated.
            tracing::debug!(event = %event, "Leadership event dropped, no consumer");
        }
    }
}

impl LeaderLatchListener for LeadershipChannel {
    fn on_promoted(&self) {
        self.send(LeadershipEvent::Promoted);
    }

    fn on_demoted(&self) {
        self.send(LeadershipEvent::Demoted);
    }
}
