//! Session manager: the single writer of session records.
//!
//! Every mutation follows the same shape:
//!
//! 1. look up the slot and wait for its gate,
//! 2. bail out with [`SessionError::NotFound`] if the slot was removed while
//!    waiting,
//! 3. compute the next record with [`machine::apply`] (plus any automation
//!    client call it depends on),
//! 4. commit it in one write and fire the [`StateListener`] if the state
//!    changed.
//!
//! Any automation failure along the way commits the session to `FAILED`
//! with `last_error` set, so callers never observe a half-applied
//! transition. The manager's submodules group the operations:
//! `qr` (issue, regenerate, expiry), `events` (automation callbacks),
//! `operator` (restart, disconnect, delete), `restore` (startup
//! re-binding) and `sweep` (periodic expiry).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::capability::Capabilities;
use crate::client::{AccountIdentity, AutomationClient, Credentials};
use crate::config::schema::OnboardingPolicy;
use crate::machine::{self, SessionEvent};
use crate::notify::{NoopListener, StateListener};
use crate::persist::{AccountMetadata, AccountStore};
use crate::registry::{AdmissionPolicy, SessionRegistry, SessionSlot, SessionStats, SlotGuard};
use crate::{ClientError, InstanceHandle, SessionError, SessionFailure, SessionId, SessionRecord};

mod events;
mod operator;
mod qr;
mod restore;
mod sweep;

#[cfg(test)]
mod tests;

pub use events::AddressedEvent;
pub use sweep::SweepReport;

/// Runtime settings for [`SessionManager`].
///
/// Usually built from the `[sessions]` config section via
/// [`SessionsConfig::to_manager_config`](crate::config::schema::SessionsConfig::to_manager_config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Validity window of an issued QR code.
    pub qr_ttl: Duration,
    /// Re-issue instead of failing when a QR expires.
    pub auto_regenerate_on_expiry: bool,
    /// Interval of the background expiry sweep.
    pub sweep_interval: Duration,
    /// Bound on every automation client call.
    pub client_timeout: Duration,
    /// Longest time a session may stay in `AUTHENTICATING`.
    pub auth_timeout: Duration,
    /// Maximum number of sessions, `None` for unlimited.
    pub max_sessions: Option<usize>,
    /// Onboarding admission policy.
    pub onboarding: OnboardingPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            qr_ttl: Duration::from_secs(30),
            auto_regenerate_on_expiry: false,
            sweep_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(20),
            auth_timeout: Duration::from_secs(120),
            max_sessions: None,
            onboarding: OnboardingPolicy::Single,
        }
    }
}

impl ManagerConfig {
    /// Admission policy derived from these settings.
    pub fn admission(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            max_sessions: self.max_sessions,
            onboarding: self.onboarding,
        }
    }
}

impl TryFrom<&crate::config::schema::SessionsConfig> for ManagerConfig {
    type Error = crate::config::ConfigError;

    fn try_from(value: &crate::config::schema::SessionsConfig) -> Result<Self, Self::Error> {
        value.to_manager_config()
    }
}

/// Orchestrates session transitions and their side effects.
///
/// Cheap to clone; clones share the registry and collaborators.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use wa_sessions::client::{ClientEvent, ScriptedClient};
/// use wa_sessions::manager::{ManagerConfig, SessionManager};
/// use wa_sessions::SessionState;
///
/// #[tokio::main]
/// async fn main() {
///     let manager = SessionManager::new(ManagerConfig::default(), Arc::new(ScriptedClient::new()));
///     let record = manager.start_onboarding().await.expect("qr issued");
///     assert_eq!(record.state, SessionState::QrReady);
///
///     manager
///         .handle_client_event(&record.id, ClientEvent::ScanDetected)
///         .await
///         .expect("scan accepted");
///     assert_eq!(
///         manager.get(&record.id).await.unwrap().state,
///         SessionState::Authenticating
///     );
/// }
/// ```
#[derive(Clone)]
pub struct SessionManager {
    config: Arc<ManagerConfig>,
    registry: SessionRegistry,
    client: Arc<dyn AutomationClient>,
    store: Option<Arc<dyn AccountStore>>,
    listener: Arc<dyn StateListener>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a manager with its own registry, no account store and no
    /// listener.
    pub fn new(config: ManagerConfig, client: Arc<dyn AutomationClient>) -> Self {
        let registry = SessionRegistry::new(config.admission());
        Self::with_registry(config, registry, client)
    }

    /// Creates a manager around an existing registry.
    ///
    /// The registry's own admission policy applies; the `max_sessions` and
    /// `onboarding` fields of `config` are ignored.
    pub fn with_registry(
        config: ManagerConfig,
        registry: SessionRegistry,
        client: Arc<dyn AutomationClient>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            client,
            store: None,
            listener: Arc::new(NoopListener),
        }
    }

    /// Persists accounts to `store` when sessions connect or log out.
    pub fn with_store(mut self, store: Arc<dyn AccountStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Notifies `listener` after every committed state change.
    pub fn with_listener(mut self, listener: Arc<dyn StateListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Returns the runtime settings.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Returns the underlying registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Creates a session in `INIT`.
    ///
    /// # Errors
    ///
    /// Admission failures from [`SessionRegistry::create`].
    pub async fn create(&self) -> Result<SessionRecord, SessionError> {
        let record = self.registry.create().await?;
        tracing::info!(session_id = %record.id, "session created");
        Ok(record)
    }

    /// Creates a session and immediately issues its first QR code.
    ///
    /// If issuing fails the session stays in the registry in `FAILED` and
    /// the client error is returned.
    pub async fn start_onboarding(&self) -> Result<SessionRecord, SessionError> {
        let record = self.create().await?;
        self.issue_qr(&record.id).await?;
        self.get(&record.id).await
    }

    /// Returns a snapshot of the session.
    ///
    /// Never waits on the session's gate or on the automation client. An
    /// expired QR is failed on the spot when nobody else is mutating the
    /// session. With `auto_regenerate_on_expiry` the replacement is requested
    /// by a background task and the expired snapshot is returned meanwhile.
    pub async fn get(&self, id: &SessionId) -> Result<SessionRecord, SessionError> {
        let slot = self.slot(id).await?;
        let snapshot = slot.snapshot();
        if !snapshot.is_qr_expired(Utc::now()) {
            return Ok(snapshot);
        }

        if self.config.auto_regenerate_on_expiry {
            self.spawn_reissue(id.clone(), slot);
            return Ok(snapshot);
        }

        // Bound to a local so the guard is dropped before `slot`.
        let expired = match slot.try_lock() {
            Some(_) if slot.is_removed() => Err(SessionError::NotFound(id.clone())),
            Some(mut guard) => self.expire_locked(&mut guard).await,
            None => Ok(snapshot),
        };
        expired
    }

    /// Re-issues an expired QR off the caller's path.
    fn spawn_reissue(&self, id: SessionId, slot: Arc<SessionSlot>) {
        // Busy gate: the current writer or the next sweep deals with it.
        if slot.try_lock().is_none() {
            return;
        }
        let manager = self.clone();
        tokio::spawn(async move {
            let Ok(mut guard) = manager.acquire(&slot, &id).await else {
                return;
            };
            let result = manager.expire_locked(&mut guard).await;
            if let Err(e) = result {
                tracing::warn!(session_id = %id, error = %e, "QR re-issue failed");
            }
        });
    }

    /// Returns snapshots of all sessions, oldest first.
    pub async fn list(&self) -> Vec<SessionRecord> {
        self.registry.list().await
    }

    /// Returns aggregate counts over all sessions.
    pub async fn stats(&self) -> SessionStats {
        self.registry.stats().await
    }

    /// Returns the operator actions currently allowed for the session.
    pub async fn capabilities(&self, id: &SessionId) -> Result<Capabilities, SessionError> {
        let slot = self.slot(id).await?;
        Ok(Capabilities::for_state(slot.state()))
    }

    // -----------------------------------------------------------------------
    // Shared plumbing for the operation submodules
    // -----------------------------------------------------------------------

    async fn slot(&self, id: &SessionId) -> Result<Arc<SessionSlot>, SessionError> {
        self.registry
            .slot(id)
            .await
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    /// Waits for the gate and rejects slots deleted in the meantime.
    async fn acquire<'a>(
        &self,
        slot: &'a SessionSlot,
        id: &SessionId,
    ) -> Result<SlotGuard<'a>, SessionError> {
        let guard = slot.lock().await;
        if guard.is_removed() {
            tracing::debug!(session_id = %id, "session removed while waiting for gate");
            return Err(SessionError::NotFound(id.clone()));
        }
        Ok(guard)
    }

    /// Applies `event` to the committed record and commits the result.
    async fn transition(
        &self,
        guard: &mut SlotGuard<'_>,
        event: SessionEvent,
    ) -> Result<SessionRecord, SessionError> {
        let current = guard.record();
        let next = machine::apply(&current, event, Utc::now())?;
        Ok(self.commit(guard, next).await)
    }

    /// Commits `next` and runs the side effects of the state change.
    ///
    /// Entering `FAILED` or `DISCONNECTED` detaches the instance handle from
    /// the record before the commit and releases it afterwards.
    async fn commit(&self, guard: &mut SlotGuard<'_>, mut next: SessionRecord) -> SessionRecord {
        let old = guard.state();
        let detached = if next.state.is_terminal() {
            next.instance.take()
        } else {
            None
        };

        debug_assert!(next.is_consistent(), "inconsistent record for {}", next.id);
        guard.commit(next.clone());

        if old != next.state {
            match next.state {
                crate::SessionState::Connected | crate::SessionState::Disconnected => {
                    tracing::info!(session_id = %next.id, from = %old, to = %next.state, "session state changed");
                }
                crate::SessionState::Failed => {
                    let reason = next.last_error.as_ref().map(|e| e.message.as_str());
                    tracing::warn!(session_id = %next.id, from = %old, reason, "session failed");
                }
                _ => {
                    tracing::debug!(session_id = %next.id, from = %old, to = %next.state, "session state changed");
                }
            }
            self.listener.on_state_changed(&next.id, old, next.state);
        }

        if let Some(handle) = detached {
            self.release_instance(&next.id, &handle).await;
        }
        next
    }

    /// Moves the session to `FAILED` because of `err` and returns the error
    /// for the caller.
    ///
    /// `working` is the caller's in-progress copy, so an instance handle
    /// opened during the operation is released too.
    async fn fail(
        &self,
        guard: &mut SlotGuard<'_>,
        working: SessionRecord,
        err: ClientError,
    ) -> SessionError {
        let now = Utc::now();
        let failure = SessionFailure::from_client(&err, now);
        match machine::apply(&working, SessionEvent::ClientFailed(failure), now) {
            Ok(next) => {
                self.commit(guard, next).await;
            }
            Err(_) => {
                // Already terminal: keep the record, drop any handle we opened.
                if working.instance != guard.record().instance {
                    if let Some(handle) = working.instance.as_ref() {
                        self.release_instance(&working.id, handle).await;
                    }
                }
            }
        }
        SessionError::AutomationClient {
            id: working.id,
            source: err,
        }
    }

    /// Runs an automation client call under `client_timeout`.
    async fn call<T, F>(&self, id: &SessionId, op: &'static str, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        match tokio::time::timeout(self.config.client_timeout, fut).await {
            Ok(result) => {
                if let Err(e) = &result {
                    tracing::debug!(session_id = %id, op, error = %e, "automation call failed");
                }
                result
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %id,
                    op,
                    timeout = ?self.config.client_timeout,
                    "automation call timed out"
                );
                Err(ClientError::Timeout(self.config.client_timeout))
            }
        }
    }

    /// Best-effort release; failures are logged and otherwise ignored.
    async fn release_instance(&self, id: &SessionId, handle: &InstanceHandle) {
        match self.call(id, "release", self.client.release(handle)).await {
            Ok(()) => tracing::debug!(session_id = %id, instance = %handle, "instance released"),
            Err(e) => tracing::warn!(
                session_id = %id,
                instance = %handle,
                error = %e,
                "failed to release instance"
            ),
        }
    }

    /// Saves the session's account. Store errors are logged only.
    ///
    /// A session whose client never reported an account is keyed by its
    /// session id, so its credentials can still be restored later.
    async fn persist(&self, record: &SessionRecord, credentials: Option<Credentials>) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let account = match record.account.clone() {
            Some(account) => account,
            None => {
                tracing::debug!(session_id = %record.id, "no account reported, keying by session id");
                AccountIdentity::new(record.id.as_str())
            }
        };
        let metadata = AccountMetadata {
            account,
            credentials,
            state: record.state,
            connected_at: record.connected_at,
        };
        if let Err(e) = store.save_account(&record.id, &metadata).await {
            tracing::warn!(
                session_id = %record.id,
                account = %metadata.account.id,
                error = %e,
                "failed to persist account"
            );
        }
    }
}
