//! Capability predicates derived from session state.
//!
//! These are pure functions of [`SessionState`]. The manager uses them to
//! guard operator actions, and a UI can call them (or serialize
//! [`Capabilities`]) to decide which controls to render.

use serde::{Deserialize, Serialize};

use crate::SessionState;

/// A QR code can be displayed.
pub fn can_show_qr(state: SessionState) -> bool {
    state == SessionState::QrReady
}

/// A new QR code can be requested.
pub fn can_regenerate(state: SessionState) -> bool {
    matches!(state, SessionState::QrReady | SessionState::Failed)
}

/// The connected account can be logged out.
pub fn can_disconnect(state: SessionState) -> bool {
    state == SessionState::Connected
}

/// The session can be deleted.
///
/// Live sessions (`QR_READY`, `AUTHENTICATING`, `CONNECTED`) have to be
/// disconnected or failed first.
pub fn can_delete(state: SessionState) -> bool {
    matches!(
        state,
        SessionState::Failed | SessionState::Disconnected | SessionState::Init
    )
}

/// The session can be restarted from scratch.
pub fn can_restart(state: SessionState) -> bool {
    state.is_terminal()
}

/// All operator actions allowed in one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub show_qr: bool,
    pub regenerate: bool,
    pub disconnect: bool,
    pub delete: bool,
    pub restart: bool,
}

impl Capabilities {
    /// Derives the capability set for `state`.
    pub fn for_state(state: SessionState) -> Self {
        Self {
            show_qr: can_show_qr(state),
            regenerate: can_regenerate(state),
            disconnect: can_disconnect(state),
            delete: can_delete(state),
            restart: can_restart(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn show_qr_only_in_qr_ready() {
        for state in SessionState::ALL {
            assert_eq!(can_show_qr(state), state == QrReady, "{state}");
        }
    }

    #[test]
    fn regenerate_in_qr_ready_and_failed() {
        let allowed: Vec<_> = SessionState::ALL
            .into_iter()
            .filter(|s| can_regenerate(*s))
            .collect();
        assert_eq!(allowed, vec![QrReady, Failed]);
    }

    #[test]
    fn disconnect_only_when_connected() {
        let allowed: Vec<_> = SessionState::ALL
            .into_iter()
            .filter(|s| can_disconnect(*s))
            .collect();
        assert_eq!(allowed, vec![Connected]);
    }

    #[test]
    fn delete_refused_for_live_sessions() {
        assert!(can_delete(Init));
        assert!(can_delete(Failed));
        assert!(can_delete(Disconnected));
        assert!(!can_delete(QrReady));
        assert!(!can_delete(Authenticating));
        assert!(!can_delete(Connected));
    }

    #[test]
    fn capabilities_bundle_matches_predicates() {
        let caps = Capabilities::for_state(Connected);
        assert_eq!(
            caps,
            Capabilities {
                show_qr: false,
                regenerate: false,
                disconnect: true,
                delete: false,
                restart: false,
            }
        );
        assert!(Capabilities::for_state(Disconnected).restart);
    }
}
