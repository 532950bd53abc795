//! Periodic expiry of stale QR codes and stalled authentications.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::SessionManager;
use crate::machine::SessionEvent;
use crate::{FailureKind, SessionFailure, SessionRecord, SessionState};

/// What one sweep pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// `QR_READY` sessions moved to `FAILED`.
    pub expired: usize,
    /// `QR_READY` sessions given a fresh code.
    pub regenerated: usize,
    /// `AUTHENTICATING` sessions failed for taking too long.
    pub auth_timed_out: usize,
}

impl SweepReport {
    /// Returns `true` if the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl SessionManager {
    /// Expires every session whose QR code or authentication has run out.
    ///
    /// Candidates are picked from snapshots, then re-checked under each
    /// session's gate, so a scan callback that got there first wins and a
    /// second pass over the same sessions is a no-op.
    pub async fn sweep_expired(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for (id, slot) in self.registry.slots().await {
            let snapshot = slot.snapshot();
            let now = Utc::now();
            let qr_stale = snapshot.is_qr_expired(now);
            let auth_stale = self.auth_overdue(&snapshot, now);
            if !qr_stale && !auth_stale {
                continue;
            }

            let Ok(mut guard) = self.acquire(&slot, &id).await else {
                continue;
            };
            let current = guard.record();
            let now = Utc::now();

            if current.is_qr_expired(now) {
                let before = current.qr.clone();
                match self.expire_locked(&mut guard).await {
                    Ok(after) if after.state == SessionState::Failed => report.expired += 1,
                    Ok(after) if after.qr != before => report.regenerated += 1,
                    Ok(_) => {}
                    Err(e) => tracing::warn!(session_id = %id, error = %e, "QR expiry failed"),
                }
            } else if self.auth_overdue(&current, now) {
                let failure = SessionFailure::new(
                    FailureKind::AuthTimeout,
                    "authentication did not complete in time",
                    now,
                );
                match self
                    .transition(&mut guard, SessionEvent::ClientFailed(failure))
                    .await
                {
                    Ok(_) => report.auth_timed_out += 1,
                    Err(e) => tracing::warn!(session_id = %id, error = %e, "auth timeout failed"),
                }
            }
        }

        if !report.is_empty() {
            tracing::debug!(
                expired = report.expired,
                regenerated = report.regenerated,
                auth_timed_out = report.auth_timed_out,
                "expiry sweep finished"
            );
        }
        report
    }

    fn auth_overdue(&self, record: &SessionRecord, now: DateTime<Utc>) -> bool {
        record.state == SessionState::Authenticating
            && now
                .signed_duration_since(record.state_since)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= self.config.auth_timeout)
    }

    /// Spawns the periodic sweep, running every `sweep_interval` until
    /// `shutdown_rx` fires.
    pub fn spawn_sweeper(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.sweep_interval);
            // The first tick completes immediately; nothing can have expired yet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.sweep_expired().await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("expiry sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}
