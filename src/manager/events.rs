//! Automation client callbacks.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::SessionManager;
use crate::client::ClientEvent;
use crate::machine::SessionEvent;
use crate::{FailureKind, QrCode, SessionError, SessionFailure, SessionId, SessionRecord, SessionState};

/// A client event addressed to one session.
pub type AddressedEvent = (SessionId, ClientEvent);

impl SessionManager {
    /// Applies a callback from the automation client.
    ///
    /// Events for unknown or deleted sessions are dropped with a debug log
    /// and reported as [`SessionError::NotFound`]. Events that make no sense
    /// in the current state return [`SessionError::IllegalTransition`] and
    /// leave the record untouched.
    ///
    /// | event           | effect                                                  |
    /// |-----------------|---------------------------------------------------------|
    /// | `QrRefreshed`   | swaps the QR and resets its expiry (only in `QR_READY`) |
    /// | `ScanDetected`  | `QR_READY -> AUTHENTICATING`                            |
    /// | `Authenticated` | `AUTHENTICATING -> CONNECTED`, then saves the account   |
    /// | `AuthFailed`    | `AUTHENTICATING -> FAILED`                              |
    /// | `LoggedOut`     | `CONNECTED -> DISCONNECTED`; a live session fails       |
    pub async fn handle_client_event(
        &self,
        id: &SessionId,
        event: ClientEvent,
    ) -> Result<SessionRecord, SessionError> {
        let Some(slot) = self.registry.slot(id).await else {
            tracing::debug!(session_id = %id, ?event, "dropping event for unknown session");
            return Err(SessionError::NotFound(id.clone()));
        };
        let mut guard = match self.acquire(&slot, id).await {
            Ok(guard) => guard,
            Err(e) => {
                tracing::debug!(session_id = %id, ?event, "dropping event for deleted session");
                return Err(e);
            }
        };

        let now = Utc::now();
        match event {
            ClientEvent::QrRefreshed { data } => {
                let state = guard.state();
                if state != SessionState::QrReady {
                    tracing::debug!(session_id = %id, %state, "ignoring QR refresh outside QR_READY");
                    return Ok(guard.record());
                }
                let qr = QrCode::new(data, now, self.config.qr_ttl);
                self.transition(&mut guard, SessionEvent::QrIssued(qr)).await
            }
            ClientEvent::ScanDetected => {
                self.transition(&mut guard, SessionEvent::ScanDetected)
                    .await
            }
            ClientEvent::Authenticated {
                account,
                credentials,
            } => {
                let record = self
                    .transition(&mut guard, SessionEvent::AuthSucceeded { account })
                    .await?;
                self.persist(&record, credentials).await;
                Ok(record)
            }
            ClientEvent::AuthFailed { reason } => {
                let failure = SessionFailure::new(FailureKind::AuthRejected, reason, now);
                self.transition(&mut guard, SessionEvent::AuthFailed(failure))
                    .await
            }
            ClientEvent::LoggedOut { reason } => {
                let state = guard.state();
                if state == SessionState::Connected {
                    let record = self
                        .transition(&mut guard, SessionEvent::Disconnected)
                        .await?;
                    self.persist(&record, None).await;
                    return Ok(record);
                }
                if state.is_terminal() {
                    return Ok(guard.record());
                }
                let message = match reason {
                    Some(reason) => format!("logged out before connecting: {reason}"),
                    None => "logged out before connecting".to_string(),
                };
                let failure = SessionFailure::new(FailureKind::Client, message, now);
                self.transition(&mut guard, SessionEvent::ClientFailed(failure))
                    .await
            }
        }
    }

    /// Spawns a task that feeds `rx` into
    /// [`handle_client_event`](Self::handle_client_event) in arrival order.
    ///
    /// The task ends when every sender is dropped.
    pub fn spawn_event_pump(&self, mut rx: mpsc::Receiver<AddressedEvent>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some((id, event)) = rx.recv().await {
                match manager.handle_client_event(&id, event).await {
                    Ok(_) | Err(SessionError::NotFound(_)) => {}
                    Err(e) => tracing::warn!(session_id = %id, error = %e, "client event rejected"),
                }
            }
            tracing::debug!("client event channel closed");
        })
    }

    /// Returns a sender for automation callbacks, pumped by a new task.
    pub fn event_sender(&self, capacity: usize) -> mpsc::Sender<AddressedEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        self.spawn_event_pump(rx);
        tx
    }
}
