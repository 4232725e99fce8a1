//! Session lifecycle signals published to the composition root.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::StatusCode;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Buffer size for the session event channel.
/// Resets are coalesced while pending, so a handful of slots is plenty.
const EVENT_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The server rejected the stored credential; the session has been cleared
    /// and all in-memory application state should be discarded.
    Unauthenticated { status: StatusCode },
}

/// Broadcasts session events and coalesces duplicate reset requests.
///
/// A reset stays pending from the first `request_reset` until a subscriber
/// calls `acknowledge`. Requests made in between are dropped.
#[derive(Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
    reset_pending: Arc<AtomicBool>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sender,
            reset_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Ask the application to restart from bootstrap.
    ///
    /// Returns true if this call published the event.
    pub fn request_reset(&self, status: StatusCode) -> bool {
        if self.reset_pending.swap(true, Ordering::AcqRel) {
            debug!(%status, "Reset already pending, ignoring");
            return false;
        }
        info!(%status, "Session rejected by server, requesting reset");
        // No subscribers is fine: nobody is left to reset
        let _ = self.sender.send(SessionEvent::Unauthenticated { status });
        true
    }

    pub fn is_reset_pending(&self) -> bool {
        self.reset_pending.load(Ordering::Acquire)
    }

    /// Mark the pending reset as handled so a later failure can trigger another.
    pub fn acknowledge(&self) {
        self.reset_pending.store(false, Ordering::Release);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reset_is_coalesced_until_acknowledged() {
        let events = SessionEvents::new();
        let mut rx = events.subscribe();

        assert!(events.request_reset(StatusCode::UNAUTHORIZED));
        assert!(!events.request_reset(StatusCode::FORBIDDEN));
        assert!(events.is_reset_pending());

        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::Unauthenticated { status: StatusCode::UNAUTHORIZED }
        );
        assert!(rx.try_recv().is_err());

        events.acknowledge();
        assert!(!events.is_reset_pending());
        assert!(events.request_reset(StatusCode::FORBIDDEN));
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::Unauthenticated { status: StatusCode::FORBIDDEN }
        );
    }

    #[test]
    fn test_reset_without_subscribers_does_not_fail() {
        let events = SessionEvents::new();
        assert!(events.request_reset(StatusCode::UNAUTHORIZED));
    }
}
