//! WhatsApp session connection core
//!
//! This crate owns the lifecycle of WhatsApp login sessions: issuing QR codes,
//! tracking scan and authentication progress reported by an external
//! automation client, and exposing the resulting states to a consuming layer
//! that polls for them.
//!
//! The main entry point is [`manager::SessionManager`], which wraps a
//! [`registry::SessionRegistry`] and drives every session through the
//! transition table in [`machine`]. Startup re-binding of previously connected
//! accounts lives in [`reconnect`].
//!
//! External collaborators are injected through traits:
//! - [`client::AutomationClient`] for the WhatsApp automation library
//! - [`persist::AccountStore`] for durable account records
//! - [`notify::StateListener`] for state-change notifications

use std::fmt;
use std::str::FromStr;

/// Capability predicates derived from session state.
pub mod capability;

/// Automation client capability and its callback events.
pub mod client;

/// Configuration loading, schema and XDG path resolution.
pub mod config;

/// Error types for session operations.
pub mod error;

/// Tracing subscriber setup.
pub mod logging;

/// Pure session state transition table.
pub mod machine;

/// Session manager orchestrating transitions and side effects.
pub mod manager;

/// State change notification interface.
pub mod notify;

/// Durable account storage interface.
pub mod persist;

/// Startup reconnection of previously connected accounts.
pub mod reconnect;

/// In-memory session registry with per-session serialization.
pub mod registry;

/// Session record and related value types.
mod session;
pub use session::*;

pub use error::{ClientError, SessionError, StoreError};

/// Connection state of a single login session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Created, no QR requested yet
    Init,
    /// QR issued and waiting to be scanned
    QrReady,
    /// QR scanned, handshake in progress
    Authenticating,
    /// Account linked and online
    Connected,
    /// Expired, rejected or broken; see `last_error`
    Failed,
    /// Was connected, then logged out or disconnected
    Disconnected,
}

impl SessionState {
    /// Every state, in declaration order.
    pub const ALL: [SessionState; 6] = [
        SessionState::Init,
        SessionState::QrReady,
        SessionState::Authenticating,
        SessionState::Connected,
        SessionState::Failed,
        SessionState::Disconnected,
    ];

    /// Returns `true` while a user is mid-way through linking an account.
    ///
    /// The single-onboarding admission policy refuses new sessions while any
    /// session reports `true` here.
    pub fn is_onboarding(self) -> bool {
        matches!(self, SessionState::QrReady | SessionState::Authenticating)
    }

    /// Returns `true` for states that only an explicit restart can leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Init => "init",
            SessionState::QrReady => "qr_ready",
            SessionState::Authenticating => "authenticating",
            SessionState::Connected => "connected",
            SessionState::Failed => "failed",
            SessionState::Disconnected => "disconnected",
        };
        write!(f, "{}", s)
    }
}

/// Error type for parsing SessionState from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStateError(pub String);

impl fmt::Display for ParseStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid session state: {}", self.0)
    }
}

impl std::error::Error for ParseStateError {}

impl FromStr for SessionState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "init" => Ok(SessionState::Init),
            "qr_ready" => Ok(SessionState::QrReady),
            "authenticating" => Ok(SessionState::Authenticating),
            "connected" => Ok(SessionState::Connected),
            "failed" => Ok(SessionState::Failed),
            "disconnected" => Ok(SessionState::Disconnected),
            _ => Err(ParseStateError(s.to_string())),
        }
    }
}

/// Opaque, immutable session identifier handed out to callers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests;
