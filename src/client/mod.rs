//! Automation client capability.
//!
//! The WhatsApp automation library is an external dependency. This module
//! defines the narrow surface the session core needs from it: creating
//! instances, fetching QR payloads, re-binding saved credentials and tearing
//! instances down. Asynchronous notifications from the library (scan,
//! authentication, logout) are delivered back as [`ClientEvent`]s through
//! [`crate::manager::SessionManager::handle_client_event`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{ClientError, InstanceHandle, SessionId};

mod scripted;
pub use scripted::ScriptedClient;

/// Identity of a linked WhatsApp account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountIdentity {
    /// Stable account id (JID or phone number).
    pub id: String,
    /// Push name reported by the phone, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl AccountIdentity {
    /// Creates an identity without a display name.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }
}

/// Opaque saved-session data produced by the automation client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub String);

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credentials(..)")
    }
}

/// Callback events reported by the automation client for one session.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The client rotated the QR code on its own.
    QrRefreshed {
        /// New opaque QR payload.
        data: String,
    },
    /// The QR code was scanned on the phone.
    ScanDetected,
    /// The handshake completed.
    Authenticated {
        /// Account that was linked, if the client reports it.
        account: Option<AccountIdentity>,
        /// Saved-session data for later reconnection.
        credentials: Option<Credentials>,
    },
    /// The handshake was rejected.
    AuthFailed {
        /// Reason reported by the client.
        reason: String,
    },
    /// The account logged out or the connection dropped for good.
    LoggedOut {
        /// Reason reported by the client, if any.
        reason: Option<String>,
    },
}

/// Operations the session core needs from the automation library.
///
/// Implementations must be cheap to share; the manager holds one behind an
/// `Arc` and calls it from many tasks. Every call is wrapped in the manager's
/// own timeout, so implementations need not enforce one.
#[async_trait]
pub trait AutomationClient: Send + Sync {
    /// Creates a fresh, unauthenticated instance for `session_id`.
    async fn open_instance(&self, session_id: &SessionId) -> Result<InstanceHandle, ClientError>;

    /// Requests a QR payload for an unauthenticated instance.
    async fn request_qr(&self, instance: &InstanceHandle) -> Result<String, ClientError>;

    /// Re-binds saved credentials, returning the live instance.
    async fn bind_existing_session(
        &self,
        session_id: &SessionId,
        credentials: &Credentials,
    ) -> Result<InstanceHandle, ClientError>;

    /// Logs the instance out of WhatsApp.
    async fn disconnect(&self, instance: &InstanceHandle) -> Result<(), ClientError>;

    /// Frees all resources held by the instance.
    async fn release(&self, instance: &InstanceHandle) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials("secret-token".to_string());
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn account_identity_omits_missing_display_name() {
        let account = AccountIdentity::new("4915100000001");
        let json = serde_json::to_string(&account).expect("should serialize");
        assert!(!json.contains("display_name"));
    }
}
