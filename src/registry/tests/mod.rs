//! Tests for the SessionRegistry module.
//!
//! Tests are organized into categories:
//! - `basic`: create, get, list and remove
//! - `admission`: capacity and single-onboarding policy
//! - `concurrent`: concurrent creation and reads
//! - `stats`: aggregate counts

mod concurrent;

use super::{AdmissionPolicy, SessionRegistry};
use crate::{SessionId, SessionState};

/// Creates a registry that admits everything.
pub(super) fn open_registry() -> SessionRegistry {
    SessionRegistry::new(AdmissionPolicy::unrestricted())
}

/// Forces a session into `state` by committing directly to its slot.
pub(super) async fn force_state(registry: &SessionRegistry, id: &SessionId, state: SessionState) {
    let slot = registry.slot(id).await.expect("session should exist");
    let mut guard = slot.lock().await;
    let mut record = guard.record();
    record.state = state;
    guard.commit(record);
}
