//! TOML configuration schema types for wa-sessions.
//!
//! All structs derive `Deserialize` and `Serialize` with sensible defaults via
//! `#[serde(default)]`.
//!
//! Duration fields use human-readable strings (e.g. `"30s"`, `"2m"`,
//! `"500ms"`) parsed by the `humantime` crate in
//! [`SessionsConfig::to_manager_config`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;
use crate::config::xdg;
use crate::manager::ManagerConfig;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration encompassing all sections.
///
/// Corresponds to the full TOML file structure:
/// ```toml
/// [sessions]
/// [persistence]
/// [logging]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Session lifecycle settings.
    pub sessions: SessionsConfig,
    /// Durable account storage settings.
    pub persistence: PersistenceConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Session lifecycle configuration from the `[sessions]` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionsConfig {
    /// How long an issued QR code stays valid.
    pub qr_ttl: String,
    /// Re-issue a QR on expiry instead of failing the session.
    pub auto_regenerate_on_expiry: bool,
    /// Interval between expiry sweeps.
    pub sweep_interval: String,
    /// Upper bound for any single automation client call.
    pub client_timeout: String,
    /// How long a session may sit in `AUTHENTICATING` before it is failed.
    pub auth_timeout: String,
    /// Maximum number of sessions; `0` means unlimited.
    pub max_sessions: usize,
    /// Whether several onboarding flows may run at once.
    pub onboarding: OnboardingPolicy,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            qr_ttl: "30s".to_string(),
            auto_regenerate_on_expiry: false,
            sweep_interval: "5s".to_string(),
            client_timeout: "20s".to_string(),
            auth_timeout: "2m".to_string(),
            max_sessions: 0,
            onboarding: OnboardingPolicy::Single,
        }
    }
}

impl SessionsConfig {
    /// Parses the duration strings into a runtime [`ManagerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDuration`] for unparseable durations and
    /// [`ConfigError::InvalidValue`] for zero TTLs or intervals.
    pub fn to_manager_config(&self) -> Result<ManagerConfig, ConfigError> {
        Ok(ManagerConfig {
            qr_ttl: parse_nonzero("sessions.qr_ttl", &self.qr_ttl)?,
            auto_regenerate_on_expiry: self.auto_regenerate_on_expiry,
            sweep_interval: parse_nonzero("sessions.sweep_interval", &self.sweep_interval)?,
            client_timeout: parse_nonzero("sessions.client_timeout", &self.client_timeout)?,
            auth_timeout: parse_nonzero("sessions.auth_timeout", &self.auth_timeout)?,
            max_sessions: (self.max_sessions > 0).then_some(self.max_sessions),
            onboarding: self.onboarding,
        })
    }
}

fn parse_nonzero(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let duration =
        humantime::parse_duration(value).map_err(|e| ConfigError::InvalidDuration {
            field,
            value: value.to_string(),
            message: e.to_string(),
        })?;
    if duration.is_zero() {
        return Err(ConfigError::InvalidValue {
            field,
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(duration)
}

/// Admission policy for new sessions.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OnboardingPolicy {
    /// Refuse new sessions while one is in `QR_READY` or `AUTHENTICATING`.
    #[default]
    Single,
    /// Allow any number of concurrent onboarding flows.
    Unrestricted,
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Account storage configuration from the `[persistence]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Path to the JSON account file. Empty string means the default data
    /// directory. Tilde (~) is expanded.
    pub accounts_file: String,
}

impl PersistenceConfig {
    /// Resolves the account file path.
    pub fn accounts_path(&self) -> PathBuf {
        if self.accounts_file.is_empty() {
            xdg::accounts_path()
        } else {
            xdg::expand_tilde(&self.accounts_file)
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log output configuration from the `[logging]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging verbosity, overridden by `WA_SESSIONS_LOG`.
    pub log_level: LogLevel,
}

/// Log verbosity levels (kebab-case in TOML).
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    /// Only errors.
    Error,
    /// Errors and warnings.
    Warn,
    /// Informational messages (default).
    #[default]
    Info,
    /// Debug-level detail.
    Debug,
    /// Full trace output.
    Trace,
}

impl LogLevel {
    /// Returns the level as an `EnvFilter` directive.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
