//! Error types for session operations.
//!
//! [`SessionError`] is what every public manager operation returns. Failures
//! from the injected collaborators are wrapped as [`ClientError`] (automation
//! layer) and [`StoreError`] (account persistence).

use std::path::PathBuf;

use thiserror::Error;

use crate::machine::EventKind;
use crate::{SessionId, SessionState};

/// Errors returned by session registry and manager operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session id does not exist or was deleted.
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// The event is not legal in the session's current state.
    #[error("Illegal transition for session {id}: {event} is not allowed in state {from}")]
    IllegalTransition {
        /// Session the transition was requested for.
        id: SessionId,
        /// State the session was in (and still is).
        from: SessionState,
        /// Event that was rejected.
        event: EventKind,
    },

    /// QR regeneration requested outside `QR_READY` or `FAILED`.
    #[error("Cannot regenerate QR for session {id} in state {state}")]
    InvalidStateForRegenerate {
        /// Session the request was made for.
        id: SessionId,
        /// Current state of the session.
        state: SessionState,
    },

    /// Deletion requested for a session that is still live.
    #[error("Cannot delete session {id} in state {state}; disconnect it first")]
    InvalidStateForDelete {
        /// Session the request was made for.
        id: SessionId,
        /// Current state of the session.
        state: SessionState,
    },

    /// The configured maximum session count has been reached.
    #[error("Session capacity exceeded (max {max})")]
    CapacityExceeded {
        /// Configured maximum number of sessions.
        max: usize,
    },

    /// Another session is already scanning or authenticating.
    #[error("Onboarding already in progress for session {active}")]
    OnboardingInProgress {
        /// Session currently holding the onboarding flow.
        active: SessionId,
    },

    /// The automation client failed; the session was moved to `FAILED`.
    #[error("Automation client error for session {id}")]
    AutomationClient {
        /// Session the call was made for.
        id: SessionId,
        /// Underlying client failure.
        #[source]
        source: ClientError,
    },

    /// The QR code expired before it was scanned.
    #[error("QR code expired for session {0}")]
    ExpiredQr(SessionId),

    /// No QR code is currently available for the session.
    #[error("No QR code available for session {id} in state {state}")]
    QrNotAvailable {
        /// Session the QR was requested for.
        id: SessionId,
        /// Current state of the session.
        state: SessionState,
    },

    /// Account persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Returns `true` if the error means the session does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound(_))
    }
}

/// Failures reported by (or while calling) the automation client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The client did not answer within the configured timeout.
    #[error("automation client timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The client (or the service behind it) is unreachable.
    #[error("automation client unavailable: {0}")]
    Unavailable(String),

    /// Saved credentials were refused by the remote side.
    #[error("stored credentials are no longer valid: {0}")]
    StaleCredentials(String),

    /// The remote side rejected the request.
    #[error("rejected by automation client: {0}")]
    Rejected(String),

    /// Any other client failure.
    #[error("automation client failure: {0}")]
    Other(String),
}

/// Errors from durable account storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to read the account file.
    #[error("Failed to read account store: {path}")]
    Read {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the account file.
    #[error("Failed to write account store: {path}")]
    Write {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The account file exists but is not valid JSON.
    #[error("Corrupt account store at {path}")]
    Corrupt {
        /// Path to the corrupt file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to encode accounts as JSON.
    #[error("Failed to encode accounts")]
    Encode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_illegal_transition_names_states() {
        let err = SessionError::IllegalTransition {
            id: SessionId::from("s-1"),
            from: SessionState::QrReady,
            event: EventKind::AuthSucceeded,
        };
        let msg = err.to_string();
        assert!(msg.contains("s-1"));
        assert!(msg.contains("qr_ready"));
        assert!(msg.contains("auth_succeeded"));
    }

    #[test]
    fn automation_error_chains_client_source() {
        let err = SessionError::AutomationClient {
            id: SessionId::from("s-1"),
            source: ClientError::Unavailable("socket closed".to_string()),
        };
        let source = std::error::Error::source(&err);
        assert!(source.is_some(), "AutomationClient should chain the client error");
        assert!(source.unwrap().to_string().contains("socket closed"));
    }

    #[test]
    fn store_error_converts_into_session_error() {
        let err: SessionError = StoreError::Encode(
            serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        )
        .into();
        assert!(matches!(err, SessionError::Store(_)));
    }

    #[test]
    fn is_not_found_only_for_not_found() {
        assert!(SessionError::NotFound(SessionId::from("x")).is_not_found());
        assert!(!SessionError::ExpiredQr(SessionId::from("x")).is_not_found());
    }

    #[test]
    fn display_capacity_exceeded_includes_limit() {
        let err = SessionError::CapacityExceeded { max: 3 };
        assert!(err.to_string().contains("max 3"));
    }
}
