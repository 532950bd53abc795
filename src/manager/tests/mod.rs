//! Tests for the SessionManager module.
//!
//! Tests are organized into categories:
//! - `onboarding`: create, issue, scan and connect
//! - `expiry`: lazy expiry, sweep and auto-regeneration
//! - `regenerate`: QR regeneration, including concurrent calls
//! - `operator`: restart, disconnect, delete and capabilities
//! - `client_failures`: automation errors and timeouts
//! - `events`: callback routing, late events and the event pump

mod expiry;
mod operator;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ManagerConfig, SessionManager};
use crate::client::ScriptedClient;
use crate::config::schema::OnboardingPolicy;
use crate::notify::StateListener;
use crate::{SessionId, SessionState};

/// Listener that records every notification in order.
#[derive(Debug, Default)]
pub(super) struct RecordingListener {
    changes: Mutex<Vec<(SessionId, SessionState, SessionState)>>,
}

impl RecordingListener {
    pub(super) fn changes(&self) -> Vec<(SessionId, SessionState, SessionState)> {
        self.changes.lock().unwrap().clone()
    }

    /// Transitions recorded for one session, as `(old, new)` pairs.
    pub(super) fn for_session(&self, id: &SessionId) -> Vec<(SessionState, SessionState)> {
        self.changes()
            .into_iter()
            .filter(|(sid, _, _)| sid == id)
            .map(|(_, old, new)| (old, new))
            .collect()
    }
}

impl StateListener for RecordingListener {
    fn on_state_changed(&self, id: &SessionId, old: SessionState, new: SessionState) {
        self.changes.lock().unwrap().push((id.clone(), old, new));
    }
}

pub(super) struct Fixture {
    pub manager: SessionManager,
    pub client: Arc<ScriptedClient>,
    pub listener: Arc<RecordingListener>,
}

/// Config with a generous QR lifetime and no onboarding restriction.
pub(super) fn test_config() -> ManagerConfig {
    ManagerConfig {
        qr_ttl: Duration::from_secs(30),
        client_timeout: Duration::from_millis(500),
        onboarding: OnboardingPolicy::Unrestricted,
        ..ManagerConfig::default()
    }
}

/// Config whose QR codes expire after 50ms.
pub(super) fn short_ttl_config() -> ManagerConfig {
    ManagerConfig {
        qr_ttl: Duration::from_millis(50),
        ..test_config()
    }
}

/// Long enough for a short-TTL code to expire.
pub(super) const PAST_TTL: Duration = Duration::from_millis(120);

pub(super) fn fixture(config: ManagerConfig) -> Fixture {
    let client = Arc::new(ScriptedClient::new());
    let listener = Arc::new(RecordingListener::default());
    let manager = SessionManager::new(config, client.clone()).with_listener(listener.clone());
    Fixture {
        manager,
        client,
        listener,
    }
}

/// Drives a fresh session all the way to `CONNECTED`.
pub(super) async fn connect(fx: &Fixture) -> SessionId {
    use crate::client::{AccountIdentity, ClientEvent};

    let record = fx.manager.start_onboarding().await.expect("start");
    fx.manager
        .handle_client_event(&record.id, ClientEvent::ScanDetected)
        .await
        .expect("scan");
    fx.manager
        .handle_client_event(
            &record.id,
            ClientEvent::Authenticated {
                account: Some(AccountIdentity::new("4915100000001")),
                credentials: None,
            },
        )
        .await
        .expect("auth");
    record.id
}
