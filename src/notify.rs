//! State change notification interface.
//!
//! The manager calls [`StateListener::on_state_changed`] synchronously after
//! every committed state change, before the triggering call returns. How the
//! change reaches a UI (WebSocket push, SSE, nothing at all) is up to the
//! listener. [`BroadcastNotifier`] fans changes out to in-process
//! subscribers over a tokio broadcast channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{SessionId, SessionState};

/// Default capacity for the subscriber notification channel.
/// This allows for bursty update scenarios without dropping notifications.
const DEFAULT_SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// Receives committed state changes. Must not block.
pub trait StateListener: Send + Sync {
    /// Called once per committed change of `state`.
    fn on_state_changed(&self, id: &SessionId, old: SessionState, new: SessionState);
}

impl<F> StateListener for F
where
    F: Fn(&SessionId, SessionState, SessionState) + Send + Sync,
{
    fn on_state_changed(&self, id: &SessionId, old: SessionState, new: SessionState) {
        self(id, old, new)
    }
}

/// Listener that ignores every change.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl StateListener for NoopListener {
    fn on_state_changed(&self, _id: &SessionId, _old: SessionState, _new: SessionState) {}
}

/// A committed state change as delivered to broadcast subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    /// Session that changed.
    pub session_id: SessionId,
    /// State before the change.
    pub old: SessionState,
    /// State after the change.
    pub new: SessionState,
    /// When the listener observed the change.
    pub at: DateTime<Utc>,
}

/// Listener that republishes changes on a broadcast channel.
///
/// Clones share the same channel.
#[derive(Clone)]
pub struct BroadcastNotifier {
    update_tx: broadcast::Sender<StateChange>,
}

impl std::fmt::Debug for BroadcastNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastNotifier")
            .field("subscriber_count", &self.update_tx.receiver_count())
            .finish()
    }
}

impl BroadcastNotifier {
    /// Creates a notifier with the default channel capacity (256 messages).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CHANNEL_CAPACITY)
    }

    /// Creates a notifier with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (update_tx, _rx) = broadcast::channel(capacity);
        Self { update_tx }
    }

    /// Subscribes to state changes committed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.update_tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.update_tx.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StateListener for BroadcastNotifier {
    fn on_state_changed(&self, id: &SessionId, old: SessionState, new: SessionState) {
        let change = StateChange {
            session_id: id.clone(),
            old,
            new,
            at: Utc::now(),
        };
        match self.update_tx.send(change) {
            Ok(count) => {
                tracing::trace!("State change sent to {} subscribers", count);
            }
            Err(_) => {
                tracing::debug!("No subscribers for state change broadcast");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn new_notifier_has_no_subscribers() {
        let notifier = BroadcastNotifier::new();
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn clones_share_subscriber_channel() {
        let notifier = BroadcastNotifier::new();
        let cloned = notifier.clone();
        let _rx = notifier.subscribe();
        assert_eq!(cloned.subscriber_count(), 1);
    }

    #[test]
    fn send_without_subscribers_does_not_panic() {
        let notifier = BroadcastNotifier::new();
        notifier.on_state_changed(
            &SessionId::from("s-1"),
            SessionState::Init,
            SessionState::QrReady,
        );
    }

    #[tokio::test]
    async fn subscriber_receives_change() {
        let notifier = BroadcastNotifier::new();
        let mut rx = notifier.subscribe();

        notifier.on_state_changed(
            &SessionId::from("s-1"),
            SessionState::QrReady,
            SessionState::Authenticating,
        );

        let change = rx.recv().await.expect("should receive change");
        assert_eq!(change.session_id, SessionId::from("s-1"));
        assert_eq!(change.old, SessionState::QrReady);
        assert_eq!(change.new, SessionState::Authenticating);
    }

    #[test]
    fn closures_are_listeners() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = move |id: &SessionId, old: SessionState, new: SessionState| {
            sink.lock().unwrap().push((id.clone(), old, new));
        };

        listener.on_state_changed(&SessionId::from("s-2"), SessionState::Init, SessionState::Failed);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].2, SessionState::Failed);
    }

    #[test]
    fn debug_includes_subscriber_count() {
        let notifier = BroadcastNotifier::new();
        let debug_str = format!("{:?}", notifier);
        assert!(debug_str.contains("BroadcastNotifier"));
        assert!(debug_str.contains("subscriber_count"));
    }
}
