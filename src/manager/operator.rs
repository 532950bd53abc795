//! Operator actions: restart, disconnect and delete.

use super::SessionManager;
use crate::capability;
use crate::machine::{EventKind, SessionEvent};
use crate::{SessionError, SessionId, SessionRecord};

impl SessionManager {
    /// Moves a `FAILED` or `DISCONNECTED` session back to `INIT`.
    ///
    /// The account binding is cleared; call [`issue_qr`](Self::issue_qr)
    /// afterwards to start onboarding again.
    pub async fn restart(&self, id: &SessionId) -> Result<SessionRecord, SessionError> {
        let slot = self.slot(id).await?;
        let mut guard = self.acquire(&slot, id).await?;
        self.transition(&mut guard, SessionEvent::Restart).await
    }

    /// Logs a `CONNECTED` session out and releases its instance.
    ///
    /// # Errors
    ///
    /// - [`SessionError::IllegalTransition`] unless the session is `CONNECTED`.
    /// - [`SessionError::AutomationClient`] if the logout call fails; the
    ///   session is then `FAILED` and its instance released anyway.
    pub async fn disconnect(&self, id: &SessionId) -> Result<SessionRecord, SessionError> {
        let slot = self.slot(id).await?;
        let mut guard = self.acquire(&slot, id).await?;

        let working = guard.record();
        if !capability::can_disconnect(working.state) {
            return Err(SessionError::IllegalTransition {
                id: id.clone(),
                from: working.state,
                event: EventKind::Disconnected,
            });
        }

        if let Some(handle) = working.instance.clone() {
            if let Err(e) = self
                .call(id, "disconnect", self.client.disconnect(&handle))
                .await
            {
                return Err(self.fail(&mut guard, working, e).await);
            }
        }

        let record = self
            .transition(&mut guard, SessionEvent::Disconnected)
            .await?;
        self.persist(&record, None).await;
        Ok(record)
    }

    /// Deletes a session and releases its instance.
    ///
    /// Returns `Ok(false)` if the id is unknown or already deleted.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidStateForDelete`] for `QR_READY`,
    /// `AUTHENTICATING` and `CONNECTED` sessions.
    pub async fn delete(&self, id: &SessionId) -> Result<bool, SessionError> {
        let Some(slot) = self.registry.slot(id).await else {
            return Ok(false);
        };
        let guard = match self.acquire(&slot, id).await {
            Ok(guard) => guard,
            Err(SessionError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        let record = guard.record();
        if !capability::can_delete(record.state) {
            return Err(SessionError::InvalidStateForDelete {
                id: id.clone(),
                state: record.state,
            });
        }

        if let Some(handle) = record.instance.as_ref() {
            self.release_instance(id, handle).await;
        }
        self.registry.remove_locked(id, &guard).await;

        tracing::info!(session_id = %id, state = %record.state, "session deleted");
        Ok(true)
    }
}
