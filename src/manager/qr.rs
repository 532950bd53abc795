//! QR code lifecycle: issue, regenerate, read and expire.

use chrono::Utc;

use super::SessionManager;
use crate::capability;
use crate::machine::{self, EventKind, SessionEvent};
use crate::registry::SlotGuard;
use crate::{
    FailureKind, QrCode, SessionError, SessionFailure, SessionId, SessionRecord, SessionState,
};

impl SessionManager {
    /// Issues the first QR code for a session in `INIT`.
    ///
    /// Opens an automation instance if the session has none, requests a QR
    /// payload and moves the session to `QR_READY` with
    /// `expires_at = now + qr_ttl`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::IllegalTransition`] if the session is not in `INIT`.
    /// - [`SessionError::OnboardingInProgress`] under the single-onboarding
    ///   policy while another session holds the onboarding slot; the session
    ///   stays in `INIT`.
    /// - [`SessionError::AutomationClient`] if the client fails or times out;
    ///   the session is then `FAILED`.
    pub async fn issue_qr(&self, id: &SessionId) -> Result<QrCode, SessionError> {
        let slot = self.slot(id).await?;
        let mut guard = self.acquire(&slot, id).await?;

        let from = guard.state();
        if from != SessionState::Init {
            return Err(SessionError::IllegalTransition {
                id: id.clone(),
                from,
                event: EventKind::QrIssued,
            });
        }
        let _claim = self.registry.claim_onboarding(id).await?;
        self.issue_locked(&mut guard).await
    }

    /// Replaces the session's QR code.
    ///
    /// From `QR_READY` the code is swapped in place. From `FAILED` the
    /// session is restarted to `INIT` and a new code issued, so listeners see
    /// `FAILED -> INIT -> QR_READY`. Concurrent calls are serialized; each one
    /// that returns `Ok` committed its own code, and the last one wins.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidStateForRegenerate`] outside `QR_READY` and
    /// `FAILED`; from `FAILED`, [`SessionError::OnboardingInProgress`] while
    /// another session onboards (the session stays `FAILED`); or a client
    /// failure as for [`issue_qr`](Self::issue_qr).
    pub async fn regenerate_qr(&self, id: &SessionId) -> Result<QrCode, SessionError> {
        let slot = self.slot(id).await?;
        let mut guard = self.acquire(&slot, id).await?;

        let state = guard.state();
        if !capability::can_regenerate(state) {
            return Err(SessionError::InvalidStateForRegenerate {
                id: id.clone(),
                state,
            });
        }
        let _claim = if state == SessionState::Failed {
            let claim = self.registry.claim_onboarding(id).await?;
            self.transition(&mut guard, SessionEvent::Restart).await?;
            Some(claim)
        } else {
            None
        };

        let qr = self.issue_locked(&mut guard).await?;
        tracing::info!(session_id = %id, from = %state, "QR regenerated");
        Ok(qr)
    }

    /// Returns the session's QR code if it is `QR_READY` and unexpired.
    ///
    /// # Errors
    ///
    /// - [`SessionError::QrNotAvailable`] outside `QR_READY`, including after
    ///   an expiry was just applied.
    /// - [`SessionError::ExpiredQr`] if the code expired and the expiry has
    ///   not been applied yet: a writer holds the session, or a replacement
    ///   code is still being requested in the background.
    pub async fn get_qr(&self, id: &SessionId) -> Result<QrCode, SessionError> {
        let record = self.get(id).await?;
        if record.state != SessionState::QrReady {
            return Err(SessionError::QrNotAvailable {
                id: id.clone(),
                state: record.state,
            });
        }
        record
            .fresh_qr(Utc::now())
            .cloned()
            .ok_or_else(|| SessionError::ExpiredQr(id.clone()))
    }

    /// Requests a QR and commits `QR_READY`. The caller holds the gate and
    /// has checked that the session is in `INIT` or `QR_READY`.
    pub(super) async fn issue_locked(
        &self,
        guard: &mut SlotGuard<'_>,
    ) -> Result<QrCode, SessionError> {
        let mut working = guard.record();
        let id = working.id.clone();

        let (handle, opened) = match working.instance.clone() {
            Some(handle) => (handle, false),
            None => match self
                .call(&id, "open_instance", self.client.open_instance(&id))
                .await
            {
                Ok(handle) => {
                    working.instance = Some(handle.clone());
                    (handle, true)
                }
                Err(e) => return Err(self.fail(guard, working, e).await),
            },
        };

        let data = match self
            .call(&id, "request_qr", self.client.request_qr(&handle))
            .await
        {
            Ok(data) => data,
            Err(e) => return Err(self.fail(guard, working, e).await),
        };

        let now = Utc::now();
        let qr = QrCode::new(data, now, self.config.qr_ttl);
        let next = match machine::apply(&working, SessionEvent::QrIssued(qr.clone()), now) {
            Ok(next) => next,
            Err(e) => {
                if opened {
                    self.release_instance(&id, &handle).await;
                }
                return Err(e);
            }
        };
        self.commit(guard, next).await;

        tracing::debug!(session_id = %id, expires_at = %qr.expires_at, "QR issued");
        Ok(qr)
    }

    /// Applies the expiry policy if the session's QR has run out.
    ///
    /// Returns the committed record afterwards, which is unchanged when the
    /// session is not `QR_READY` or its code is still valid. Calling this
    /// twice is harmless: the second call finds `FAILED` (or a fresh code)
    /// and does nothing.
    pub(super) async fn expire_locked(
        &self,
        guard: &mut SlotGuard<'_>,
    ) -> Result<SessionRecord, SessionError> {
        let current = guard.record();
        let now = Utc::now();
        if current.state != SessionState::QrReady || !current.is_qr_expired(now) {
            return Ok(current);
        }

        if self.config.auto_regenerate_on_expiry {
            tracing::debug!(session_id = %current.id, "QR expired, issuing a fresh one");
            match self.issue_locked(guard).await {
                // A client failure already committed FAILED.
                Ok(_) | Err(SessionError::AutomationClient { .. }) => return Ok(guard.record()),
                Err(e) => return Err(e),
            }
        }

        let failure = SessionFailure::new(
            FailureKind::QrExpired,
            "QR code expired before it was scanned",
            now,
        );
        self.transition(guard, SessionEvent::QrExpired(failure)).await
    }
}
