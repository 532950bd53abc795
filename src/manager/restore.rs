//! Re-binding of previously connected accounts.

use chrono::Utc;

use super::SessionManager;
use crate::client::{AccountIdentity, Credentials};
use crate::machine::{self, SessionEvent};
use crate::registry::SlotGuard;
use crate::{SessionError, SessionRecord};

impl SessionManager {
    /// Creates a session for `account` and re-binds it with `credentials`,
    /// skipping the QR step.
    ///
    /// The session goes `INIT -> AUTHENTICATING` before the client is called
    /// and ends up `CONNECTED`, or `FAILED` with `last_error` describing the
    /// client failure.
    ///
    /// # Errors
    ///
    /// Capacity errors from the registry (no session is created), or
    /// [`SessionError::AutomationClient`] after the session was failed.
    pub async fn restore_account(
        &self,
        account: &AccountIdentity,
        credentials: &Credentials,
    ) -> Result<SessionRecord, SessionError> {
        let record = self.registry.create_restored(account).await?;
        let id = record.id.clone();
        let slot = self.slot(&id).await?;
        let mut guard = self.acquire(&slot, &id).await?;

        let result = self.bind_restored(&mut guard, account, credentials).await;
        // Whatever happened, later QR flows for this session onboard normally.
        slot.finish_restoring();
        result
    }

    async fn bind_restored(
        &self,
        guard: &mut SlotGuard<'_>,
        account: &AccountIdentity,
        credentials: &Credentials,
    ) -> Result<SessionRecord, SessionError> {
        self.transition(
            guard,
            SessionEvent::Resume {
                account: account.clone(),
            },
        )
        .await?;

        let mut working = guard.record();
        let id = working.id.clone();
        let handle = match self
            .call(
                &id,
                "bind_existing_session",
                self.client.bind_existing_session(&id, credentials),
            )
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(session_id = %id, account = %account.id, error = %e, "reconnection failed");
                return Err(self.fail(guard, working, e).await);
            }
        };
        working.instance = Some(handle);

        let next = machine::apply(
            &working,
            SessionEvent::AuthSucceeded {
                account: Some(account.clone()),
            },
            Utc::now(),
        )?;
        let connected = self.commit(guard, next).await;
        self.persist(&connected, None).await;
        Ok(connected)
    }
}
