//! Session record and the value types it carries.
//!
//! A [`SessionRecord`] is always handed out as a snapshot. Mutation happens
//! only inside the manager, by applying a [`crate::machine::SessionEvent`]
//! to a copy and committing the result.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::AccountIdentity;
use crate::{ClientError, SessionId, SessionState};

/// Opaque reference to the automation-client instance bound to a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceHandle(pub String);

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A QR payload together with its validity window.
///
/// `data` is passed through untouched; whether it holds raw pairing data or
/// an encoded image is up to the automation client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCode {
    /// Opaque QR payload.
    pub data: String,
    /// When this payload was obtained.
    pub issued_at: DateTime<Utc>,
    /// First instant at which the payload is no longer valid.
    pub expires_at: DateTime<Utc>,
}

impl QrCode {
    /// Stamps `data` with a validity window of `ttl` starting at `now`.
    pub fn new(data: String, now: DateTime<Utc>, ttl: std::time::Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            data,
            issued_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Returns `true` once `now` has reached the expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Category of a session failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// QR was not scanned before it expired.
    QrExpired,
    /// The phone or server rejected the login.
    AuthRejected,
    /// Authentication did not complete in time.
    AuthTimeout,
    /// Saved credentials could not be reused.
    StaleCredentials,
    /// The automation client could not be reached.
    ClientUnavailable,
    /// The automation client did not answer in time.
    ClientTimeout,
    /// Any other automation client failure.
    Client,
}

impl From<&ClientError> for FailureKind {
    fn from(err: &ClientError) -> Self {
        match err {
            ClientError::Timeout(_) => FailureKind::ClientTimeout,
            ClientError::Unavailable(_) => FailureKind::ClientUnavailable,
            ClientError::StaleCredentials(_) => FailureKind::StaleCredentials,
            ClientError::Rejected(_) => FailureKind::AuthRejected,
            ClientError::Other(_) => FailureKind::Client,
        }
    }
}

/// Error descriptor stored on a session while it is `FAILED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable description.
    pub message: String,
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
}

impl SessionFailure {
    /// Creates a failure descriptor.
    pub fn new(kind: FailureKind, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            message: message.into(),
            at,
        }
    }

    /// Describes an automation client error.
    pub fn from_client(err: &ClientError, at: DateTime<Utc>) -> Self {
        Self::new(FailureKind::from(err), err.to_string(), at)
    }
}

/// Record of a committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    /// When the transition was committed.
    pub at: DateTime<Utc>,
    /// Previous state.
    pub from: SessionState,
    /// New state.
    pub to: SessionState,
    /// Milliseconds spent in the previous state.
    pub duration_ms: i64,
}

/// Snapshot of one login session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// External handle for the session.
    pub id: SessionId,
    /// Current connection state.
    pub state: SessionState,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the current state was entered.
    pub state_since: DateTime<Utc>,
    /// Set on each entry into `CONNECTED`.
    pub connected_at: Option<DateTime<Utc>>,
    /// Current QR; present only in `QR_READY`.
    pub qr: Option<QrCode>,
    /// Cause of the failure; present only in `FAILED`.
    pub last_error: Option<SessionFailure>,
    /// Automation-client instance exclusively owned by this session.
    pub instance: Option<InstanceHandle>,
    /// Account linked through this session, once known.
    pub account: Option<AccountIdentity>,
    /// Committed state changes, oldest first.
    pub history: Vec<StateTransition>,
}

impl SessionRecord {
    /// Creates a fresh record in `INIT`.
    pub fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            state: SessionState::Init,
            created_at: now,
            state_since: now,
            connected_at: None,
            qr: None,
            last_error: None,
            instance: None,
            account: None,
            history: Vec::new(),
        }
    }

    /// Returns `true` if the session holds a QR that has expired at `now`.
    pub fn is_qr_expired(&self, now: DateTime<Utc>) -> bool {
        self.qr.as_ref().is_some_and(|qr| qr.is_expired(now))
    }

    /// Returns the QR only if it is still valid at `now`.
    pub fn fresh_qr(&self, now: DateTime<Utc>) -> Option<&QrCode> {
        self.qr.as_ref().filter(|qr| !qr.is_expired(now))
    }

    /// Checks the state-tied field invariants.
    ///
    /// `qr` must be present exactly in `QR_READY` and `last_error` exactly in
    /// `FAILED`.
    pub fn is_consistent(&self) -> bool {
        let qr_ok = self.qr.is_some() == (self.state == SessionState::QrReady);
        let error_ok = self.last_error.is_some() == (self.state == SessionState::Failed);
        qr_ok && error_ok
    }
}
