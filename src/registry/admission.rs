//! Registry-wide admission policy for new sessions and onboarding flows.

use std::sync::{Arc, Mutex};

use crate::config::schema::OnboardingPolicy;
use crate::{SessionError, SessionId};

/// Rules applied when sessions are created and when they start onboarding.
///
/// Scope is the whole registry. With [`OnboardingPolicy::Single`] at most one
/// session may hold the onboarding slot, that is be in `QR_READY` or
/// `AUTHENTICATING`: [`SessionRegistry::create`](super::SessionRegistry::create)
/// refuses new sessions while one does, and issuing a first QR code (or
/// regenerating from `FAILED`) is refused the same way.
///
/// Sessions being restored at startup pass through `AUTHENTICATING` without
/// a QR code. They never hold the onboarding slot, so a user can start
/// linking a new account while reconnection is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdmissionPolicy {
    /// Maximum number of sessions held at once; `None` means unlimited.
    pub max_sessions: Option<usize>,
    /// Whether concurrent onboarding flows are allowed.
    pub onboarding: OnboardingPolicy,
}

impl AdmissionPolicy {
    /// A policy that admits everything.
    pub fn unrestricted() -> Self {
        Self {
            max_sessions: None,
            onboarding: OnboardingPolicy::Unrestricted,
        }
    }

    /// Checks whether one more session may be created.
    ///
    /// `existing` yields every session with whether it holds the onboarding
    /// slot. `restored` sessions come from startup reconnection and skip the
    /// onboarding rule, since they never show a QR code.
    pub(crate) fn admit<'a>(
        &self,
        existing: impl IntoIterator<Item = (&'a SessionId, bool)>,
        restored: bool,
    ) -> Result<(), SessionError> {
        let mut count = 0usize;
        let mut onboarding: Option<&SessionId> = None;

        for (id, holds_onboarding) in existing {
            count += 1;
            if onboarding.is_none() && holds_onboarding {
                onboarding = Some(id);
            }
        }

        if let Some(max) = self.max_sessions {
            if count >= max {
                return Err(SessionError::CapacityExceeded { max });
            }
        }

        if !restored && self.onboarding == OnboardingPolicy::Single {
            if let Some(active) = onboarding {
                return Err(SessionError::OnboardingInProgress {
                    active: active.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Session currently moving from `INIT` towards `QR_READY`, if any.
pub(crate) type PendingOnboarding = Arc<Mutex<Option<SessionId>>>;

/// Reservation of the onboarding slot while a first QR code is requested.
///
/// Released on drop. Once the session has committed `QR_READY` its state
/// holds the slot, so the reservation is no longer needed.
#[must_use]
pub(crate) struct OnboardingClaim {
    held: Option<(PendingOnboarding, SessionId)>,
}

impl OnboardingClaim {
    pub(crate) fn unclaimed() -> Self {
        Self { held: None }
    }

    pub(crate) fn new(pending: PendingOnboarding, id: SessionId) -> Self {
        Self {
            held: Some((pending, id)),
        }
    }
}

impl Drop for OnboardingClaim {
    fn drop(&mut self) {
        if let Some((pending, id)) = self.held.take() {
            let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
            if pending.as_ref() == Some(&id) {
                *pending = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<SessionId> {
        (0..n).map(|i| SessionId::from(format!("s-{i}"))).collect()
    }

    #[test]
    fn unlimited_capacity_admits() {
        let ids = ids(50);
        let policy = AdmissionPolicy::unrestricted();
        let existing = ids.iter().map(|id| (id, false));
        assert!(policy.admit(existing, false).is_ok());
    }

    #[test]
    fn capacity_counts_every_state() {
        let ids = ids(2);
        let policy = AdmissionPolicy {
            max_sessions: Some(2),
            onboarding: OnboardingPolicy::Unrestricted,
        };
        let existing = ids.iter().map(|id| (id, false));
        let err = policy.admit(existing, true).unwrap_err();
        assert!(matches!(err, SessionError::CapacityExceeded { max: 2 }));
    }

    #[test]
    fn single_onboarding_names_active_session() {
        let ids = ids(2);
        let policy = AdmissionPolicy::default();
        let existing = vec![(&ids[0], false), (&ids[1], true)];
        match policy.admit(existing, false) {
            Err(SessionError::OnboardingInProgress { active }) => assert_eq!(active, ids[1]),
            other => panic!("expected OnboardingInProgress, got {other:?}"),
        }
    }

    #[test]
    fn restored_sessions_bypass_onboarding_rule() {
        let ids = ids(1);
        let policy = AdmissionPolicy::default();
        let existing = vec![(&ids[0], true)];
        assert!(policy.admit(existing, true).is_ok());
    }

    #[test]
    fn claim_clears_pending_on_drop() {
        let pending: PendingOnboarding = Arc::default();
        *pending.lock().unwrap() = Some(SessionId::from("s-1"));
        drop(OnboardingClaim::new(Arc::clone(&pending), SessionId::from("s-1")));
        assert!(pending.lock().unwrap().is_none());
    }

    #[test]
    fn claim_leaves_other_holder_alone() {
        let pending: PendingOnboarding = Arc::default();
        *pending.lock().unwrap() = Some(SessionId::from("s-2"));
        drop(OnboardingClaim::new(Arc::clone(&pending), SessionId::from("s-1")));
        assert_eq!(*pending.lock().unwrap(), Some(SessionId::from("s-2")));
    }

    #[test]
    fn sessions_without_onboarding_slot_do_not_block() {
        let ids = ids(2);
        let policy = AdmissionPolicy::default();
        let existing = vec![(&ids[0], false), (&ids[1], false)];
        assert!(policy.admit(existing, false).is_ok());
    }
}
