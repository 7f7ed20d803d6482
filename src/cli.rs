//! Command-line interface for forkscribe
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Telephony audio-fork to streaming speech-recognition bridge
#[derive(Parser, Debug)]
#[command(
    name = "forkscribe",
    version,
    about = "Bridges telephony audio-fork streams to streaming speech-recognition providers"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the channel session controller (foreground process for systemd)
    Controller {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/forkscribe.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Run the provider proxy bridge
    Bridge {
        /// Listen address, overrides bridge.listen (e.g., 0.0.0.0:8777)
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },

    /// Get controller status via IPC
    Status {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/forkscribe.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Inject an event-bus message (JSON) into the controller
    PublishBus {
        /// Bus message, e.g. '{"core":{"header":{"name":"MeetingCreatedEvtMsg"},"body":{...}}}'
        message: String,

        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/forkscribe.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Print every message the controller publishes, one JSON object per line
    Follow {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/forkscribe.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file, defaults and environment)
    Show,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["forkscribe"]).is_err());
    }

    #[test]
    fn test_parse_controller_with_socket() {
        let cli =
            Cli::try_parse_from(["forkscribe", "controller", "--socket", "/tmp/f.sock"]).unwrap();
        match cli.command {
            Commands::Controller { socket } => {
                assert_eq!(socket, Some(PathBuf::from("/tmp/f.sock")));
            }
            other => panic!("Expected Controller, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bridge_listen_override() {
        let cli = Cli::try_parse_from(["forkscribe", "bridge", "--listen", "127.0.0.1:9000"])
            .unwrap();
        match cli.command {
            Commands::Bridge { listen } => assert_eq!(listen.as_deref(), Some("127.0.0.1:9000")),
            other => panic!("Expected Bridge, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_publish_bus() {
        let cli = Cli::try_parse_from(["forkscribe", "publish-bus", r#"{"core":{}}"#]).unwrap();
        match cli.command {
            Commands::PublishBus { message, socket } => {
                assert_eq!(message, r#"{"core":{}}"#);
                assert!(socket.is_none());
            }
            other => panic!("Expected PublishBus, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["forkscribe", "status", "-vv", "--config", "/etc/f.toml"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/f.toml")));
        assert!(!cli.quiet);
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["forkscribe", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["forkscribe", "completions", "bash"]).unwrap();
        assert!(matches!(cli.command, Commands::Completions { shell: Shell::Bash }));
    }
}
