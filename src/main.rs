//! wa-sessions - CLI entry point
//!
//! Small operator tool around the session core: manages the configuration
//! file and inspects the persisted account store.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use wa_sessions::config::{default, loader::ConfigLoader, schema::LogLevel, xdg};
use wa_sessions::{logging, persist};

/// WhatsApp session core tooling
#[derive(Parser)]
#[command(name = "wa-sessions")]
#[command(version, about = "WhatsApp session core tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the wa-sessions CLI
#[derive(Subcommand)]
enum Commands {
    /// Manage configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Inspect persisted accounts
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },
}

/// Actions for the `config` subcommand.
#[derive(Subcommand)]
enum ConfigAction {
    /// Create default configuration file
    Init {
        /// Overwrite existing configuration (creates backup)
        #[arg(long)]
        force: bool,
    },
    /// Print configuration file path
    Path,
    /// Validate configuration file
    Validate {
        /// Config file to check instead of the default location
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

/// Actions for the `accounts` subcommand.
#[derive(Subcommand)]
enum AccountsAction {
    /// List accounts in the JSON account store
    List {
        /// Account file to read instead of the configured one
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = ConfigLoader::load_default().ok();
    let level = config
        .as_ref()
        .map(|c| c.logging.log_level)
        .unwrap_or(LogLevel::Info);
    logging::init(level);

    match cli.command {
        Commands::Config { action } => {
            let result = match action {
                ConfigAction::Init { force } => default::create_default_config(force).map(|path| {
                    println!("Created configuration at {}", path.display());
                }),
                ConfigAction::Path => {
                    println!("{}", xdg::config_path().display());
                    Ok(())
                }
                ConfigAction::Validate { path } => ConfigLoader::load_validated(path.as_deref())
                    .map(|config| {
                        println!("Configuration is valid");
                        println!("  qr_ttl: {}", config.sessions.qr_ttl);
                        println!("  onboarding: {:?}", config.sessions.onboarding);
                        println!("  accounts file: {}", config.persistence.accounts_path().display());
                    }),
            };
            if let Err(e) = result {
                eprintln!("Config error: {e}");
                return ExitCode::FAILURE;
            }
        }
        Commands::Accounts { action } => match action {
            AccountsAction::List { file } => {
                let path = file.unwrap_or_else(|| {
                    config
                        .as_ref()
                        .map(|c| c.persistence.accounts_path())
                        .unwrap_or_else(xdg::accounts_path)
                });
                match persist::read_accounts(&path) {
                    Ok(accounts) if accounts.is_empty() => {
                        println!("No accounts in {}", path.display());
                    }
                    Ok(accounts) => {
                        for (id, account) in accounts {
                            let name = account.account.display_name.as_deref().unwrap_or("-");
                            let since = account
                                .connected_at
                                .map(|t| t.to_rfc3339())
                                .unwrap_or_else(|| "-".to_string());
                            println!(
                                "{id}\t{name}\t{}\t{}\t{since}",
                                account.last_known_state, account.session_id
                            );
                        }
                    }
                    Err(e) => {
                        eprintln!("Account store error: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            }
        },
    }

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_init_parses() {
        let cli = Cli::try_parse_from(["wa-sessions", "config", "init"])
            .expect("config init should parse");
        match cli.command {
            Commands::Config {
                action: ConfigAction::Init { force },
            } => assert!(!force),
            _ => panic!("expected Config Init"),
        }
    }

    #[test]
    fn test_config_init_force_parses() {
        let cli = Cli::try_parse_from(["wa-sessions", "config", "init", "--force"])
            .expect("config init --force should parse");
        match cli.command {
            Commands::Config {
                action: ConfigAction::Init { force },
            } => assert!(force),
            _ => panic!("expected Config Init"),
        }
    }

    #[test]
    fn test_config_validate_with_path() {
        let cli = Cli::try_parse_from(["wa-sessions", "config", "validate", "--path", "/tmp/c.toml"])
            .expect("config validate should parse");
        match cli.command {
            Commands::Config {
                action: ConfigAction::Validate { path },
            } => assert_eq!(path, Some(PathBuf::from("/tmp/c.toml"))),
            _ => panic!("expected Config Validate"),
        }
    }

    #[test]
    fn test_accounts_list_parses() {
        let cli = Cli::try_parse_from(["wa-sessions", "accounts", "list"])
            .expect("accounts list should parse");
        match cli.command {
            Commands::Accounts {
                action: AccountsAction::List { file },
            } => assert!(file.is_none()),
            _ => panic!("expected Accounts List"),
        }
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["wa-sessions", "daemon"]).is_err());
    }
}
