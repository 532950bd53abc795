//! Session state transition table.
//!
//! [`apply`] is a pure function: it validates an event against the current
//! state and returns the next record without touching the input. The manager
//! commits the returned record in a single write, so a rejected event never
//! leaves a partially updated session behind.
//!
//! | from                      | event          | to               |
//! |---------------------------|----------------|------------------|
//! | `INIT`                    | `QrIssued`     | `QR_READY`       |
//! | `QR_READY`                | `QrIssued`     | `QR_READY`       |
//! | `QR_READY`                | `ScanDetected` | `AUTHENTICATING` |
//! | `QR_READY`                | `QrExpired`    | `FAILED`         |
//! | `AUTHENTICATING`          | `AuthSucceeded`| `CONNECTED`      |
//! | `AUTHENTICATING`          | `AuthFailed`   | `FAILED`         |
//! | `CONNECTED`               | `Disconnected` | `DISCONNECTED`   |
//! | `FAILED`, `DISCONNECTED`  | `Restart`      | `INIT`           |
//! | `INIT`                    | `Resume`       | `AUTHENTICATING` |
//!
//! `ClientFailed` moves any live state (`INIT`, `QR_READY`, `AUTHENTICATING`,
//! `CONNECTED`) to `FAILED`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::AccountIdentity;
use crate::{QrCode, SessionError, SessionFailure, SessionRecord, SessionState, StateTransition};

/// Something that happened to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A fresh QR was obtained (initial issue, regeneration or client refresh).
    QrIssued(QrCode),
    /// The QR was scanned on the phone.
    ScanDetected,
    /// The handshake completed.
    AuthSucceeded {
        /// Account reported by the client, if any.
        account: Option<AccountIdentity>,
    },
    /// The handshake was rejected.
    AuthFailed(SessionFailure),
    /// The QR validity window elapsed.
    QrExpired(SessionFailure),
    /// The connected account logged out or was disconnected.
    Disconnected,
    /// Operator restart of a finished session.
    Restart,
    /// Startup re-binding of a saved account, skipping the QR step.
    Resume {
        /// Account being restored.
        account: AccountIdentity,
    },
    /// The automation client failed while serving the session.
    ClientFailed(SessionFailure),
}

impl SessionEvent {
    /// Returns the payload-free discriminant of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::QrIssued(_) => EventKind::QrIssued,
            SessionEvent::ScanDetected => EventKind::ScanDetected,
            SessionEvent::AuthSucceeded { .. } => EventKind::AuthSucceeded,
            SessionEvent::AuthFailed(_) => EventKind::AuthFailed,
            SessionEvent::QrExpired(_) => EventKind::QrExpired,
            SessionEvent::Disconnected => EventKind::Disconnected,
            SessionEvent::Restart => EventKind::Restart,
            SessionEvent::Resume { .. } => EventKind::Resume,
            SessionEvent::ClientFailed(_) => EventKind::ClientFailed,
        }
    }
}

/// Payload-free event discriminant, used in the transition table and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    QrIssued,
    ScanDetected,
    AuthSucceeded,
    AuthFailed,
    QrExpired,
    Disconnected,
    Restart,
    Resume,
    ClientFailed,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [EventKind; 9] = [
        EventKind::QrIssued,
        EventKind::ScanDetected,
        EventKind::AuthSucceeded,
        EventKind::AuthFailed,
        EventKind::QrExpired,
        EventKind::Disconnected,
        EventKind::Restart,
        EventKind::Resume,
        EventKind::ClientFailed,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::QrIssued => "qr_issued",
            EventKind::ScanDetected => "scan_detected",
            EventKind::AuthSucceeded => "auth_succeeded",
            EventKind::AuthFailed => "auth_failed",
            EventKind::QrExpired => "qr_expired",
            EventKind::Disconnected => "disconnected",
            EventKind::Restart => "restart",
            EventKind::Resume => "resume",
            EventKind::ClientFailed => "client_failed",
        };
        write!(f, "{}", s)
    }
}

/// Looks up the destination state for `event` in state `from`.
///
/// Returns `None` when the pair is not in the transition table.
pub fn target(from: SessionState, event: EventKind) -> Option<SessionState> {
    use EventKind as E;
    use SessionState as S;

    match (from, event) {
        (S::Init, E::QrIssued) => Some(S::QrReady),
        (S::QrReady, E::QrIssued) => Some(S::QrReady),
        (S::QrReady, E::ScanDetected) => Some(S::Authenticating),
        (S::QrReady, E::QrExpired) => Some(S::Failed),
        (S::Authenticating, E::AuthSucceeded) => Some(S::Connected),
        (S::Authenticating, E::AuthFailed) => Some(S::Failed),
        (S::Connected, E::Disconnected) => Some(S::Disconnected),
        (S::Failed | S::Disconnected, E::Restart) => Some(S::Init),
        (S::Init, E::Resume) => Some(S::Authenticating),
        (S::Init | S::QrReady | S::Authenticating | S::Connected, E::ClientFailed) => {
            Some(S::Failed)
        }
        _ => None,
    }
}

/// Returns the events accepted in `state`.
pub fn allowed_events(state: SessionState) -> Vec<EventKind> {
    EventKind::ALL
        .into_iter()
        .filter(|event| target(state, *event).is_some())
        .collect()
}

/// Applies `event` to a copy of `record`.
///
/// State-tied fields follow the state: `qr` exists only in `QR_READY`,
/// `last_error` only in `FAILED`, and every entry into `CONNECTED` stamps
/// `connected_at`. The instance handle is left as-is; binding and releasing
/// it is the caller's job.
///
/// # Errors
///
/// Returns [`SessionError::IllegalTransition`] if the event is not legal in
/// the record's current state.
pub fn apply(
    record: &SessionRecord,
    event: SessionEvent,
    now: DateTime<Utc>,
) -> Result<SessionRecord, SessionError> {
    let kind = event.kind();
    let Some(to) = target(record.state, kind) else {
        return Err(SessionError::IllegalTransition {
            id: record.id.clone(),
            from: record.state,
            event: kind,
        });
    };

    let mut next = record.clone();

    match event {
        SessionEvent::QrIssued(qr) => next.qr = Some(qr),
        SessionEvent::AuthSucceeded { account } => {
            next.connected_at = Some(now);
            if account.is_some() {
                next.account = account;
            }
        }
        SessionEvent::Resume { account } => next.account = Some(account),
        SessionEvent::AuthFailed(failure)
        | SessionEvent::QrExpired(failure)
        | SessionEvent::ClientFailed(failure) => next.last_error = Some(failure),
        SessionEvent::Restart => next.account = None,
        SessionEvent::ScanDetected | SessionEvent::Disconnected => {}
    }

    if to != SessionState::QrReady {
        next.qr = None;
    }
    if to != SessionState::Failed {
        next.last_error = None;
    }

    if to != record.state {
        next.history.push(StateTransition {
            at: now,
            from: record.state,
            to,
            duration_ms: now.signed_duration_since(record.state_since).num_milliseconds(),
        });
        next.state = to;
        next.state_since = now;
    }

    Ok(next)
}
