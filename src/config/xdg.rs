//! Platform-aware path resolution for wa-sessions.
//!
//! On **Linux**, follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/wa-sessions` or `~/.config/wa-sessions`
//! - Data: `$XDG_DATA_HOME/wa-sessions` or `~/.local/share/wa-sessions`
//!
//! On **macOS**, uses Apple conventions with XDG env var overrides:
//! - Config and data: `~/Library/Application Support/wa-sessions`

use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "wa-sessions";

/// Returns the configuration directory for wa-sessions.
///
/// Resolution order:
/// 1. `$XDG_CONFIG_HOME/wa-sessions` (if env var set, any platform)
/// 2. Platform default (`dirs::config_dir()`)
/// 3. `./wa-sessions` when no home directory can be determined
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join(APP_NAME);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the path to the main configuration file.
///
/// Resolves to `config_dir()/config.toml`.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Returns the data directory for durable state.
///
/// Resolution order:
/// 1. `$XDG_DATA_HOME/wa-sessions` (if env var set, any platform)
/// 2. Platform default (`dirs::data_dir()`)
/// 3. `./wa-sessions` when no home directory can be determined
pub fn data_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join(APP_NAME);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the default account store path, `data_dir()/accounts.json`.
pub fn accounts_path() -> PathBuf {
    data_dir().join("accounts.json")
}

/// Expands a leading `~` in a path string to the user's home directory.
///
/// If the path does not start with `~`, or no home directory is known, it
/// is returned as-is.
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        (None, Some(home)) if path == "~" => home,
        _ => PathBuf::from(path),
    }
}

/// Creates a directory and all parent directories with mode 0700.
///
/// Equivalent to `mkdir -p` with restricted permissions.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Creates the configuration directory if it does not exist, returning its path.
pub fn ensure_config_dir() -> std::io::Result<PathBuf> {
    let dir = config_dir();
    ensure_dir(&dir)?;
    Ok(dir)
}
