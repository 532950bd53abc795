//! QR expiry tests: lazy reads, the sweep and auto-regeneration.

use std::time::Duration;

use super::{fixture, short_ttl_config, test_config, PAST_TTL};
use crate::client::ClientEvent;
use crate::manager::ManagerConfig;
use crate::{FailureKind, SessionError, SessionState};

/// Reading an expired QR moves the session to FAILED.
#[tokio::test]
async fn test_expired_qr_fails_session_on_read() {
    let fx = fixture(short_ttl_config());
    let record = fx.manager.start_onboarding().await.expect("start");

    tokio::time::sleep(PAST_TTL).await;

    match fx.manager.get_qr(&record.id).await {
        Err(SessionError::QrNotAvailable { state, .. }) => assert_eq!(state, SessionState::Failed),
        other => panic!("expected QrNotAvailable after expiry, got {other:?}"),
    }
    let failed = fx.manager.get(&record.id).await.expect("get");
    assert_eq!(failed.state, SessionState::Failed);
    assert!(failed.qr.is_none());
    let error = failed.last_error.expect("last_error populated");
    assert_eq!(error.kind, FailureKind::QrExpired);
    assert!(failed.instance.is_none(), "instance released on failure");
    assert_eq!(fx.client.live_instances(), 0);
}

/// With auto-regeneration the session stays QR_READY and a new code is
/// requested in the background.
#[tokio::test]
async fn test_expired_qr_regenerates_when_enabled() {
    let fx = fixture(ManagerConfig {
        auto_regenerate_on_expiry: true,
        ..short_ttl_config()
    });
    let record = fx.manager.start_onboarding().await.expect("start");
    let first = record.qr.clone().expect("first qr");

    tokio::time::sleep(PAST_TTL).await;

    match fx.manager.get_qr(&record.id).await {
        Err(SessionError::ExpiredQr(id)) => assert_eq!(id, record.id),
        other => panic!("expected ExpiredQr while the new code is pending, got {other:?}"),
    }

    let qr = wait_for_fresh_qr(&fx, &record.id).await;
    assert_ne!(qr.data, first.data);
    assert!(qr.expires_at > first.expires_at);

    let current = fx.manager.get(&record.id).await.expect("get");
    assert_eq!(current.state, SessionState::QrReady);
    assert!(current.last_error.is_none());
    assert_eq!(
        fx.listener.for_session(&record.id),
        vec![(SessionState::Init, SessionState::QrReady)],
        "in-place swap does not notify"
    );
}

/// Reads return the stored snapshot without waiting on a slow client.
#[tokio::test]
async fn test_read_does_not_wait_for_reissue() {
    let fx = fixture(ManagerConfig {
        auto_regenerate_on_expiry: true,
        ..short_ttl_config()
    });
    let record = fx.manager.start_onboarding().await.expect("start");
    fx.client.set_qr_delay(Duration::from_millis(400));
    tokio::time::sleep(PAST_TTL).await;

    let read = tokio::time::timeout(Duration::from_millis(100), fx.manager.get(&record.id))
        .await
        .expect("get returns before the client answers")
        .expect("get");
    assert_eq!(read.state, SessionState::QrReady);
    assert_eq!(read.qr, record.qr, "stale code is returned as stored");

    let again = tokio::time::timeout(Duration::from_millis(100), fx.manager.get_qr(&record.id))
        .await
        .expect("get_qr returns while the re-issue holds the gate");
    assert!(matches!(again, Err(SessionError::ExpiredQr(_))));

    let qr = wait_for_fresh_qr(&fx, &record.id).await;
    assert_ne!(Some(&qr), record.qr.as_ref());
    assert_eq!(fx.client.qr_requests(), 2, "one re-issue for several reads");
}

/// Polls until the session carries an unexpired code.
async fn wait_for_fresh_qr(fx: &super::Fixture, id: &crate::SessionId) -> crate::QrCode {
    for _ in 0..200 {
        if let Some(qr) = fx
            .manager
            .registry()
            .get(id)
            .await
            .and_then(|r| r.fresh_qr(chrono::Utc::now()).cloned())
        {
            return qr;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no fresh QR was issued");
}

/// Two sweeps over an expired session change it once and notify once.
#[tokio::test]
async fn test_sweep_is_idempotent() {
    let fx = fixture(short_ttl_config());
    let record = fx.manager.start_onboarding().await.expect("start");
    tokio::time::sleep(PAST_TTL).await;

    let first = fx.manager.sweep_expired().await;
    assert_eq!(first.expired, 1);
    let after_first = fx.manager.registry().get(&record.id).await.expect("exists");
    assert_eq!(after_first.state, SessionState::Failed);

    let second = fx.manager.sweep_expired().await;
    assert!(second.is_empty());
    let after_second = fx.manager.registry().get(&record.id).await.expect("exists");
    assert_eq!(after_second, after_first);

    assert_eq!(
        fx.listener.for_session(&record.id),
        vec![
            (SessionState::Init, SessionState::QrReady),
            (SessionState::QrReady, SessionState::Failed),
        ]
    );
}

#[tokio::test]
async fn test_sweep_leaves_fresh_codes_alone() {
    let fx = fixture(test_config());
    let record = fx.manager.start_onboarding().await.expect("start");

    assert!(fx.manager.sweep_expired().await.is_empty());
    let current = fx.manager.get(&record.id).await.expect("get");
    assert_eq!(current.state, SessionState::QrReady);
}

/// A scan that lands before the sweep wins; the sweep then skips the session.
#[tokio::test]
async fn test_scan_before_sweep_wins() {
    let fx = fixture(short_ttl_config());
    let record = fx.manager.start_onboarding().await.expect("start");

    fx.manager
        .handle_client_event(&record.id, ClientEvent::ScanDetected)
        .await
        .expect("scan");
    tokio::time::sleep(PAST_TTL).await;

    assert!(fx.manager.sweep_expired().await.is_empty());
    let current = fx.manager.get(&record.id).await.expect("get");
    assert_eq!(current.state, SessionState::Authenticating);
}

#[tokio::test]
async fn test_sweep_fails_stalled_authentication() {
    let fx = fixture(ManagerConfig {
        auth_timeout: Duration::from_millis(50),
        ..test_config()
    });
    let record = fx.manager.start_onboarding().await.expect("start");
    fx.manager
        .handle_client_event(&record.id, ClientEvent::ScanDetected)
        .await
        .expect("scan");

    tokio::time::sleep(PAST_TTL).await;
    let report = fx.manager.sweep_expired().await;
    assert_eq!(report.auth_timed_out, 1);

    let failed = fx.manager.get(&record.id).await.expect("get");
    assert_eq!(failed.state, SessionState::Failed);
    assert_eq!(
        failed.last_error.map(|e| e.kind),
        Some(FailureKind::AuthTimeout)
    );
}

#[tokio::test]
async fn test_spawned_sweeper_expires_and_stops() {
    let fx = fixture(ManagerConfig {
        sweep_interval: Duration::from_millis(20),
        ..short_ttl_config()
    });
    let record = fx.manager.start_onboarding().await.expect("start");

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let handle = fx.manager.spawn_sweeper(shutdown_rx);

    tokio::time::sleep(Duration::from_millis(250)).await;
    let current = fx.manager.registry().get(&record.id).await.expect("exists");
    assert_eq!(current.state, SessionState::Failed);

    shutdown_tx.send(()).expect("sweeper listening");
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweeper should stop")
        .expect("sweeper task panicked");
}
