//! Concurrent access tests for SessionRegistry.

use std::collections::HashSet;

use super::{force_state, open_registry};
use crate::config::schema::OnboardingPolicy;
use crate::registry::{AdmissionPolicy, SessionRegistry};
use crate::SessionState;

/// Ids stay unique across many concurrent creates.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_yield_unique_ids() {
    let registry = open_registry();
    let mut handles = vec![];
    for _ in 0..64 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.create().await.expect("should create").id
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let id = handle.await.expect("Creator task panicked");
        assert!(ids.insert(id), "duplicate id handed out");
    }
    assert_eq!(registry.len().await, 64);
}

/// Racing creates under a capacity of one admit exactly one session.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_respect_capacity() {
    let registry = SessionRegistry::new(AdmissionPolicy {
        max_sessions: Some(1),
        onboarding: OnboardingPolicy::Unrestricted,
    });

    let mut handles = vec![];
    for _ in 0..16 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move { registry.create().await.is_ok() }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.expect("Creator task panicked") {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(registry.len().await, 1);
}

/// Reads do not wait for a writer holding the gate.
#[tokio::test]
async fn test_reads_do_not_block_on_gate() {
    let registry = open_registry();
    let record = registry.create().await.expect("should create");
    force_state(&registry, &record.id, SessionState::QrReady).await;

    let slot = registry.slot(&record.id).await.expect("slot");
    let _guard = slot.lock().await;

    let read = tokio::time::timeout(std::time::Duration::from_millis(200), async {
        (
            registry.get(&record.id).await,
            registry.list().await,
            registry.stats().await,
        )
    })
    .await
    .expect("reads should not wait for the gate");
    assert_eq!(read.0.map(|r| r.state), Some(SessionState::QrReady));
    assert_eq!(read.1.len(), 1);
    assert_eq!(read.2.total, 1);
}
