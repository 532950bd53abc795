//! Startup re-binding of previously connected accounts.
//!
//! The coordinator reads the account store once and restores every account
//! whose last known state was `CONNECTED`. Attempts run concurrently; a
//! failed or panicking attempt is counted and logged without touching the
//! others. Sessions still being restored do not hold the onboarding slot.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::client::AccountIdentity;
use crate::manager::SessionManager;
use crate::persist::AccountStore;
use crate::{SessionError, SessionId};

/// Outcome of one reconnection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectReport {
    /// Sessions that reached `CONNECTED`, by account id.
    pub connected: Vec<(String, SessionId)>,
    /// Account ids whose restore attempt failed.
    pub failed: Vec<String>,
    /// Account ids not previously connected, left alone.
    pub skipped: Vec<String>,
}

impl ReconnectReport {
    /// Total number of accounts the store returned.
    pub fn total(&self) -> usize {
        self.connected.len() + self.failed.len() + self.skipped.len()
    }
}

/// Restores previously connected accounts on startup.
pub struct ReconnectionCoordinator {
    manager: SessionManager,
    store: Arc<dyn AccountStore>,
}

impl ReconnectionCoordinator {
    pub fn new(manager: SessionManager, store: Arc<dyn AccountStore>) -> Self {
        Self { manager, store }
    }

    /// Loads persisted accounts and re-binds each previously connected one.
    ///
    /// Every restored session ends `CONNECTED` or `FAILED`; failures are
    /// recorded on the session itself (`last_error`) and counted here.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] only if the account list cannot be
    /// loaded. Per-account failures never fail the run.
    pub async fn run(&self) -> Result<ReconnectReport, SessionError> {
        let accounts = self.store.load_persisted_accounts().await?;
        let mut report = ReconnectReport::default();
        let mut attempts = JoinSet::new();
        let mut in_flight = HashMap::new();

        for persisted in accounts {
            let account_id = persisted.account.id.clone();
            let credentials = match (persisted.was_connected(), persisted.credentials) {
                (true, Some(credentials)) => credentials,
                _ => {
                    tracing::debug!(
                        account = %account_id,
                        state = %persisted.last_known_state,
                        "skipping account that was not connected"
                    );
                    report.skipped.push(account_id);
                    continue;
                }
            };

            let manager = self.manager.clone();
            let account: AccountIdentity = persisted.account;
            let handle = attempts.spawn(async move {
                let result = manager.restore_account(&account, &credentials).await;
                (account.id, result)
            });
            in_flight.insert(handle.id(), account_id);
        }

        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok((account_id, Ok(record))) => report.connected.push((account_id, record.id)),
                Ok((account_id, Err(e))) => {
                    tracing::warn!(account = %account_id, error = %e, "account not restored");
                    report.failed.push(account_id);
                }
                Err(e) => {
                    let account_id = in_flight
                        .remove(&e.id())
                        .unwrap_or_else(|| String::from("<unknown>"));
                    tracing::error!(account = %account_id, error = %e, "reconnection task aborted");
                    report.failed.push(account_id);
                }
            }
        }

        report.connected.sort();
        report.failed.sort();
        report.skipped.sort();

        tracing::info!(
            connected = report.connected.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "reconnection finished"
        );
        Ok(report)
    }
}
