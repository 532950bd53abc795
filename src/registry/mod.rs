//! Session registry for the session core.
//!
//! This module provides a thread-safe, in-memory map of every live session.
//! It uses `Arc<RwLock<HashMap>>` for O(1) lookups by session id, and wraps
//! each record in its own slot so that mutations of one session never wait on
//! another. The map lock is only held long enough to look up, insert or
//! remove a slot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::client::AccountIdentity;
use crate::config::schema::OnboardingPolicy;
use crate::{SessionError, SessionId, SessionRecord, SessionState};

#[cfg(test)]
mod tests;

mod admission;
mod slot;

pub use admission::AdmissionPolicy;
pub(crate) use admission::OnboardingClaim;
pub(crate) use slot::{SessionSlot, SlotGuard};

/// Aggregate counts over the registry, computed on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Number of sessions in the registry.
    pub total: usize,
    /// Number of sessions in `CONNECTED`.
    pub connected: usize,
    /// Count per state; every state is present, possibly with zero.
    pub by_state: BTreeMap<SessionState, usize>,
}

/// Thread-safe session registry wrapping a HashMap with `Arc<RwLock>`.
///
/// The registry owns id allocation and admission. It does not know the
/// transition table; [`SessionManager`](crate::manager::SessionManager) is
/// the only writer of records after creation.
///
/// # Example
///
/// ```
/// use wa_sessions::registry::{AdmissionPolicy, SessionRegistry};
/// use wa_sessions::SessionState;
///
/// #[tokio::main]
/// async fn main() {
///     let registry = SessionRegistry::new(AdmissionPolicy::unrestricted());
///     let record = registry.create().await.expect("admitted");
///     assert_eq!(record.state, SessionState::Init);
///     assert!(registry.get(&record.id).await.is_some());
/// }
/// ```
#[derive(Clone)]
pub struct SessionRegistry {
    slots: Arc<RwLock<HashMap<SessionId, Arc<SessionSlot>>>>,
    policy: AdmissionPolicy,
    pending_onboarding: admission::PendingOnboarding,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Creates an empty registry enforcing `policy` on creation.
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            policy,
            pending_onboarding: Arc::default(),
        }
    }

    /// Returns the admission policy.
    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Allocates a new session in `INIT` and returns its snapshot.
    ///
    /// # Errors
    ///
    /// - [`SessionError::CapacityExceeded`] when `max_sessions` is reached.
    /// - [`SessionError::OnboardingInProgress`] when the single-onboarding
    ///   policy is active and another session is in `QR_READY` or
    ///   `AUTHENTICATING`.
    pub async fn create(&self) -> Result<SessionRecord, SessionError> {
        self.insert(None, false).await
    }

    /// Allocates a session for an account being restored at startup.
    ///
    /// Skips the onboarding rule but still respects capacity. The session
    /// does not hold the onboarding slot until the manager finishes the
    /// re-bind.
    pub async fn create_restored(
        &self,
        account: &AccountIdentity,
    ) -> Result<SessionRecord, SessionError> {
        self.insert(Some(account), true).await
    }

    async fn insert(
        &self,
        account: Option<&AccountIdentity>,
        restored: bool,
    ) -> Result<SessionRecord, SessionError> {
        let mut slots = self.slots.write().await;

        // Admission and insert share this write lock, so two racing creates
        // cannot both pass the onboarding check.
        self.policy
            .admit(
                slots.iter().map(|(id, slot)| (id, slot.holds_onboarding())),
                restored,
            )?;

        let mut id = SessionId::generate();
        while slots.contains_key(&id) {
            id = SessionId::generate();
        }

        let mut record = SessionRecord::new(id.clone(), Utc::now());
        record.account = account.cloned();
        slots.insert(
            id,
            Arc::new(SessionSlot::new(record.clone(), restored)),
        );

        tracing::debug!(session_id = %record.id, restored, "session created");
        Ok(record)
    }

    /// Returns a snapshot of the session, or `None` if it does not exist.
    pub async fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.slot(id).await.map(|slot| slot.snapshot())
    }

    /// Returns snapshots of all sessions, oldest first.
    pub async fn list(&self) -> Vec<SessionRecord> {
        let slots = self.slots.read().await;
        let mut records: Vec<_> = slots.values().map(|slot| slot.snapshot()).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }

    /// Removes the session without touching its automation instance.
    ///
    /// Returns the last committed snapshot, or `None` if the id was unknown.
    /// Any writer still waiting on the slot will observe it as removed.
    pub async fn remove(&self, id: &SessionId) -> Option<SessionRecord> {
        let slot = self.slots.write().await.remove(id)?;
        slot.mark_removed();
        tracing::debug!(session_id = %id, "session removed");
        Some(slot.snapshot())
    }

    /// Computes counts over the current records.
    pub async fn stats(&self) -> SessionStats {
        let slots = self.slots.read().await;
        let mut by_state: BTreeMap<SessionState, usize> =
            SessionState::ALL.into_iter().map(|s| (s, 0)).collect();
        for slot in slots.values() {
            *by_state.entry(slot.state()).or_default() += 1;
        }
        SessionStats {
            total: slots.len(),
            connected: by_state
                .get(&SessionState::Connected)
                .copied()
                .unwrap_or_default(),
            by_state,
        }
    }

    /// Returns the number of sessions.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Returns `true` if the registry holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    pub(crate) async fn slot(&self, id: &SessionId) -> Option<Arc<SessionSlot>> {
        self.slots.read().await.get(id).cloned()
    }

    pub(crate) async fn slots(&self) -> Vec<(SessionId, Arc<SessionSlot>)> {
        self.slots
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect()
    }

    /// Reserves the onboarding slot for `id` before its first QR code.
    ///
    /// The caller holds `id`'s gate and keeps the claim until `QR_READY` is
    /// committed or the attempt failed. Under
    /// [`OnboardingPolicy::Unrestricted`] every claim succeeds.
    ///
    /// # Errors
    ///
    /// [`SessionError::OnboardingInProgress`] if another session is in
    /// `QR_READY` or `AUTHENTICATING`, or is itself about to get a QR code.
    pub(crate) async fn claim_onboarding(
        &self,
        id: &SessionId,
    ) -> Result<OnboardingClaim, SessionError> {
        if self.policy.onboarding == OnboardingPolicy::Unrestricted {
            return Ok(OnboardingClaim::unclaimed());
        }

        let slots = self.slots.read().await;
        let mut pending = self
            .pending_onboarding
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let active = pending
            .as_ref()
            .filter(|pending_id| *pending_id != id)
            .cloned()
            .or_else(|| {
                slots
                    .iter()
                    .find(|(other, slot)| *other != id && slot.holds_onboarding())
                    .map(|(other, _)| other.clone())
            });
        if let Some(active) = active {
            return Err(SessionError::OnboardingInProgress { active });
        }

        *pending = Some(id.clone());
        Ok(OnboardingClaim::new(
            Arc::clone(&self.pending_onboarding),
            id.clone(),
        ))
    }

    /// Removes `id` while the caller holds its gate.
    pub(crate) async fn remove_locked(&self, id: &SessionId, guard: &SlotGuard<'_>) {
        self.slots.write().await.remove(id);
        guard.mark_removed();
        tracing::debug!(session_id = %id, "session removed");
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(AdmissionPolicy::default())
    }
}
