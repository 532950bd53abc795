//! Restart, disconnect, delete and capability tests.

use super::{connect, fixture, test_config};
use crate::capability::Capabilities;
use crate::client::ClientEvent;
use crate::{ClientError, SessionError, SessionId, SessionState};

#[tokio::test]
async fn test_disconnect_releases_instance() {
    let fx = fixture(test_config());
    let id = connect(&fx).await;
    let handle = fx.manager.get(&id).await.unwrap().instance.expect("bound");

    let record = fx.manager.disconnect(&id).await.expect("disconnect");
    assert_eq!(record.state, SessionState::Disconnected);
    assert!(record.instance.is_none());
    assert_eq!(fx.client.disconnected(), vec![handle.clone()]);
    assert!(fx.client.released().contains(&handle));
    assert_eq!(fx.client.live_instances(), 0);
}

#[tokio::test]
async fn test_disconnect_requires_connected() {
    let fx = fixture(test_config());
    let record = fx.manager.start_onboarding().await.expect("start");

    let err = fx.manager.disconnect(&record.id).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::IllegalTransition {
            from: SessionState::QrReady,
            ..
        }
    ));
    assert!(fx.client.disconnected().is_empty());
}

#[tokio::test]
async fn test_disconnect_failure_lands_in_failed() {
    let fx = fixture(test_config());
    let id = connect(&fx).await;
    fx.client
        .fail_next_disconnect(ClientError::Unavailable("socket closed".into()));

    let err = fx.manager.disconnect(&id).await.unwrap_err();
    assert!(matches!(err, SessionError::AutomationClient { .. }));

    let record = fx.manager.get(&id).await.expect("get");
    assert_eq!(record.state, SessionState::Failed);
    assert!(record.last_error.is_some());
    assert_eq!(fx.client.live_instances(), 0, "instance released anyway");
}

/// Deleting an unknown id is `false`; deleting a live session is refused.
#[tokio::test]
async fn test_delete_safety() {
    let fx = fixture(test_config());
    assert!(!fx.manager.delete(&SessionId::from("nope")).await.expect("no error"));

    let id = connect(&fx).await;
    match fx.manager.delete(&id).await {
        Err(SessionError::InvalidStateForDelete { state, .. }) => {
            assert_eq!(state, SessionState::Connected)
        }
        other => panic!("expected InvalidStateForDelete, got {other:?}"),
    }
    assert!(fx.manager.get(&id).await.is_ok(), "still present");

    fx.manager.disconnect(&id).await.expect("disconnect");
    assert!(fx.manager.delete(&id).await.expect("delete"));
    assert!(fx.manager.get(&id).await.unwrap_err().is_not_found());
    assert!(!fx.manager.delete(&id).await.expect("second delete"));
}

#[tokio::test]
async fn test_delete_refused_while_onboarding() {
    let fx = fixture(test_config());
    let record = fx.manager.start_onboarding().await.expect("start");
    assert!(matches!(
        fx.manager.delete(&record.id).await,
        Err(SessionError::InvalidStateForDelete {
            state: SessionState::QrReady,
            ..
        })
    ));

    fx.manager
        .handle_client_event(&record.id, ClientEvent::ScanDetected)
        .await
        .expect("scan");
    assert!(matches!(
        fx.manager.delete(&record.id).await,
        Err(SessionError::InvalidStateForDelete {
            state: SessionState::Authenticating,
            ..
        })
    ));
}

#[tokio::test]
async fn test_delete_init_session() {
    let fx = fixture(test_config());
    let record = fx.manager.create().await.expect("create");
    assert!(fx.manager.delete(&record.id).await.expect("delete"));
    assert_eq!(fx.manager.stats().await.total, 0);
    assert!(fx.listener.changes().is_empty(), "delete is not a state change");
}

#[tokio::test]
async fn test_restart_returns_to_init() {
    let fx = fixture(test_config());
    let id = connect(&fx).await;
    fx.manager.disconnect(&id).await.expect("disconnect");

    let record = fx.manager.restart(&id).await.expect("restart");
    assert_eq!(record.state, SessionState::Init);
    assert!(record.account.is_none());
    assert!(record.last_error.is_none());

    fx.manager.issue_qr(&id).await.expect("eligible for a new QR");
}

#[tokio::test]
async fn test_restart_refused_for_live_session() {
    let fx = fixture(test_config());
    let id = connect(&fx).await;
    assert!(matches!(
        fx.manager.restart(&id).await,
        Err(SessionError::IllegalTransition {
            from: SessionState::Connected,
            ..
        })
    ));
}

#[tokio::test]
async fn test_capabilities_follow_state() {
    let fx = fixture(test_config());
    let record = fx.manager.start_onboarding().await.expect("start");
    let caps = fx.manager.capabilities(&record.id).await.expect("caps");
    assert_eq!(caps, Capabilities::for_state(SessionState::QrReady));
    assert!(caps.show_qr && caps.regenerate && !caps.delete);

    let id = connect(&fx).await;
    let caps = fx.manager.capabilities(&id).await.expect("caps");
    assert!(caps.disconnect && !caps.show_qr);
}
