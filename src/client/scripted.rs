//! In-memory automation client with scriptable responses.
//!
//! Hands out sequential QR payloads (`qr-1`, `qr-2`, ...) and instance
//! handles, records every call, and can be told to fail or stall specific
//! operations. Useful for tests and for exercising the session core without
//! a real WhatsApp connection.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{AutomationClient, Credentials};
use crate::{ClientError, InstanceHandle, SessionId};

#[derive(Debug, Default)]
struct ScriptState {
    next_instance: u64,
    next_qr: u64,
    qr_failures: VecDeque<ClientError>,
    open_failures: VecDeque<ClientError>,
    disconnect_failures: VecDeque<ClientError>,
    bind_failures: HashMap<String, ClientError>,
    qr_delay: Option<Duration>,
    bind_delay: Option<Duration>,
    live: HashSet<InstanceHandle>,
    released: Vec<InstanceHandle>,
    disconnected: Vec<InstanceHandle>,
    qr_requests: usize,
}

/// Scriptable [`AutomationClient`] that never touches the network.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    state: Mutex<ScriptState>,
}

impl ScriptedClient {
    /// Creates a client where every call succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ScriptState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Makes the next `request_qr` call fail with `err`.
    pub fn fail_next_qr(&self, err: ClientError) {
        self.with_state(|s| s.qr_failures.push_back(err));
    }

    /// Makes the next `open_instance` call fail with `err`.
    pub fn fail_next_open(&self, err: ClientError) {
        self.with_state(|s| s.open_failures.push_back(err));
    }

    /// Makes the next `disconnect` call fail with `err`.
    pub fn fail_next_disconnect(&self, err: ClientError) {
        self.with_state(|s| s.disconnect_failures.push_back(err));
    }

    /// Makes every `bind_existing_session` with `credentials` fail with `err`.
    pub fn reject_credentials(&self, credentials: &Credentials, err: ClientError) {
        self.with_state(|s| {
            s.bind_failures.insert(credentials.0.clone(), err);
        });
    }

    /// Delays every `request_qr` call by `delay`.
    pub fn set_qr_delay(&self, delay: Duration) {
        self.with_state(|s| s.qr_delay = Some(delay));
    }

    /// Delays every `bind_existing_session` call by `delay`.
    pub fn set_bind_delay(&self, delay: Duration) {
        self.with_state(|s| s.bind_delay = Some(delay));
    }

    /// Returns the number of `request_qr` calls served so far.
    pub fn qr_requests(&self) -> usize {
        self.with_state(|s| s.qr_requests)
    }

    /// Returns the instances opened or bound and not yet released.
    pub fn live_instances(&self) -> usize {
        self.with_state(|s| s.live.len())
    }

    /// Returns every released instance, in release order.
    pub fn released(&self) -> Vec<InstanceHandle> {
        self.with_state(|s| s.released.clone())
    }

    /// Returns every disconnected instance, in call order.
    pub fn disconnected(&self) -> Vec<InstanceHandle> {
        self.with_state(|s| s.disconnected.clone())
    }

    fn mint_instance(&self, prefix: &str) -> InstanceHandle {
        self.with_state(|s| {
            s.next_instance += 1;
            let handle = InstanceHandle(format!("{}-{}", prefix, s.next_instance));
            s.live.insert(handle.clone());
            handle
        })
    }
}

#[async_trait]
impl AutomationClient for ScriptedClient {
    async fn open_instance(&self, _session_id: &SessionId) -> Result<InstanceHandle, ClientError> {
        if let Some(err) = self.with_state(|s| s.open_failures.pop_front()) {
            return Err(err);
        }
        Ok(self.mint_instance("instance"))
    }

    async fn request_qr(&self, instance: &InstanceHandle) -> Result<String, ClientError> {
        let delay = self.with_state(|s| s.qr_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.with_state(|s| {
            s.qr_requests += 1;
            if let Some(err) = s.qr_failures.pop_front() {
                return Err(err);
            }
            if !s.live.contains(instance) {
                return Err(ClientError::Other(format!("unknown instance {}", instance)));
            }
            s.next_qr += 1;
            Ok(format!("qr-{}", s.next_qr))
        })
    }

    async fn bind_existing_session(
        &self,
        _session_id: &SessionId,
        credentials: &Credentials,
    ) -> Result<InstanceHandle, ClientError> {
        let delay = self.with_state(|s| s.bind_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.with_state(|s| s.bind_failures.get(&credentials.0).cloned()) {
            return Err(err);
        }
        Ok(self.mint_instance("bound"))
    }

    async fn disconnect(&self, instance: &InstanceHandle) -> Result<(), ClientError> {
        self.with_state(|s| {
            s.disconnected.push(instance.clone());
            match s.disconnect_failures.pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }

    async fn release(&self, instance: &InstanceHandle) -> Result<(), ClientError> {
        self.with_state(|s| {
            s.live.remove(instance);
            s.released.push(instance.clone());
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn qr_payloads_are_sequential() {
        let client = ScriptedClient::new();
        let handle = client.open_instance(&SessionId::from("s")).await.unwrap();
        assert_eq!(client.request_qr(&handle).await.unwrap(), "qr-1");
        assert_eq!(client.request_qr(&handle).await.unwrap(), "qr-2");
        assert_eq!(client.qr_requests(), 2);
    }

    #[tokio::test]
    async fn scripted_qr_failure_is_consumed_once() {
        let client = ScriptedClient::new();
        let handle = client.open_instance(&SessionId::from("s")).await.unwrap();
        client.fail_next_qr(ClientError::Unavailable("down".into()));

        assert!(client.request_qr(&handle).await.is_err());
        assert!(client.request_qr(&handle).await.is_ok());
    }

    #[tokio::test]
    async fn release_drops_live_instance() {
        let client = ScriptedClient::new();
        let handle = client.open_instance(&SessionId::from("s")).await.unwrap();
        assert_eq!(client.live_instances(), 1);

        client.release(&handle).await.unwrap();
        assert_eq!(client.live_instances(), 0);
        assert_eq!(client.released(), vec![handle]);
    }

    #[tokio::test]
    async fn rejected_credentials_fail_bind() {
        let client = ScriptedClient::new();
        let bad = Credentials("bad".into());
        client.reject_credentials(&bad, ClientError::StaleCredentials("revoked".into()));

        let err = client
            .bind_existing_session(&SessionId::from("s"), &bad)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::StaleCredentials(_)));

        let good = Credentials("good".into());
        assert!(client
            .bind_existing_session(&SessionId::from("s"), &good)
            .await
            .is_ok());
    }
}
