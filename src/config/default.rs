//! Default configuration template and file creation utilities.
//!
//! Provides a commented TOML template that matches `Config::default()`
//! and a function to write it to the XDG config path.

use std::fs;
use std::path::PathBuf;

use crate::config::error::ConfigError;
use crate::config::xdg;

/// A commented TOML template with all default values.
///
/// Every value here must match `Config::default()` from `schema.rs`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# wa-sessions configuration
#
# All values shown below are the built-in defaults.
#
# Location: $XDG_CONFIG_HOME/wa-sessions/config.toml

# ==============================================================================
# Sessions
# ==============================================================================

[sessions]

# How long an issued QR code stays valid before it is swept.
qr_ttl = "30s"

# When a QR code expires, issue a fresh one instead of failing the session.
auto_regenerate_on_expiry = false

# How often the expiry sweeper runs.
sweep_interval = "5s"

# Upper bound for any single call into the automation client.
client_timeout = "20s"

# A session stuck in AUTHENTICATING longer than this is failed.
auth_timeout = "2m"

# Maximum number of sessions held at once. 0 means unlimited.
max_sessions = 0

# Onboarding admission policy.
# Options: "single", "unrestricted"
#   single       - refuse new sessions while one is scanning or authenticating
#   unrestricted - allow concurrent onboarding flows
onboarding = "single"

# ==============================================================================
# Persistence
# ==============================================================================

[persistence]

# Account file used for reconnection on startup.
# Empty string means $XDG_DATA_HOME/wa-sessions/accounts.json.
accounts_file = ""

# ==============================================================================
# Logging
# ==============================================================================

[logging]

# Options: "error", "warn", "info", "debug", "trace"
# The WA_SESSIONS_LOG environment variable takes precedence.
log_level = "info"
"#;

/// Creates (or force-overwrites) the default config file.
///
/// - If the file exists and `force` is `false`, returns `ConfigError::AlreadyExists`.
/// - If the file exists and `force` is `true`, backs it up to `.toml.backup` first.
/// - Returns the path where the config was written.
pub fn create_default_config(force: bool) -> Result<PathBuf, ConfigError> {
    let path = xdg::config_path();

    if path.exists() {
        if !force {
            return Err(ConfigError::AlreadyExists { path });
        }
        let backup_path = path.with_extension("toml.backup");
        fs::rename(&path, &backup_path).map_err(|e| ConfigError::WriteError {
            path: backup_path.clone(),
            source: e,
        })?;
        tracing::info!("Backed up existing config to {}", backup_path.display());
    }

    write_default_config(&path)?;
    Ok(path)
}

/// Writes the default template to `path`, creating parent dirs and setting 0600 permissions.
fn write_default_config(path: &PathBuf) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::WriteError {
        path: path.clone(),
        source,
    };

    xdg::ensure_config_dir().map_err(write_err)?;
    fs::write(path, DEFAULT_CONFIG_TEMPLATE).map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(write_err)?;
    }

    Ok(())
}
