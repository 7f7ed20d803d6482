use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use forkscribe::bridge::run_bridge;
use forkscribe::cli::{Cli, Commands, ConfigAction};
use forkscribe::config::Config;
use forkscribe::daemon::run_controller;
use forkscribe::ipc::client::{follow, send_command};
use forkscribe::ipc::protocol::{Command, Response};
use forkscribe::ipc::server::IpcServer;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    forkscribe::logging::init(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Controller { socket } => {
            let config = load_config(cli.config.as_deref())?;
            run_controller(config, socket).await?;
        }
        Commands::Bridge { listen } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(listen) = listen {
                config.bridge.listen = listen;
                config.validate()?;
            }
            run_bridge(config.bridge).await?;
        }
        Commands::Status { socket } => {
            handle_ipc_command(resolve_socket(socket, cli.config.as_deref()), Command::Status)
                .await?;
        }
        Commands::PublishBus { message, socket } => {
            let message: serde_json::Value =
                serde_json::from_str(&message).context("Bus message is not valid JSON")?;
            handle_ipc_command(
                resolve_socket(socket, cli.config.as_deref()),
                Command::Bus { message },
            )
            .await?;
        }
        Commands::Follow { socket } => {
            handle_follow(resolve_socket(socket, cli.config.as_deref())).await?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "forkscribe",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/forkscribe/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Socket from the flag, else from the config file, else the default.
fn resolve_socket(socket: Option<PathBuf>, custom_path: Option<&Path>) -> PathBuf {
    socket
        .or_else(|| {
            load_config(custom_path)
                .ok()
                .and_then(|config| config.controller.socket)
        })
        .unwrap_or_else(IpcServer::default_socket_path)
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_display_toml()?);
        }
        ConfigAction::Path => {
            let path = custom_path
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Send IPC command to the controller and print the response.
async fn handle_ipc_command(socket_path: PathBuf, command: Command) -> Result<()> {
    match send_command(&socket_path, command).await {
        Ok(Response::Ok) => {
            println!("{}", "OK".green());
        }
        Ok(Response::Status {
            version,
            esl_connected,
            channels,
            active,
            stop_pending,
            restart_pending,
        }) => {
            let client_version = forkscribe::version_string();

            println!("Status:");
            println!("  {}      {}", "Client:".dimmed(), client_version);
            print!("  {}  {}", "Controller:".dimmed(), version);
            if client_version != version {
                print!(" {}", "(version mismatch!)".yellow());
            }
            println!();
            println!(
                "  {} {}",
                "Event socket:".dimmed(),
                if esl_connected {
                    "connected".green().to_string()
                } else {
                    "disconnected".red().to_string()
                }
            );
            println!("  {}    {}", "Channels:".dimmed(), channels);
            println!("  {}      {}", "Active:".dimmed(), active);
            println!("  {}  {}", "Stopping:".dimmed(), stop_pending);
            println!("  {} {}", "Restarting:".dimmed(), restart_pending);
        }
        Ok(Response::Published { channel, message }) => {
            println!("{} {}", channel.dimmed(), message);
        }
        Ok(Response::Error { message }) => {
            eprintln!("{} {}", "Error:".red(), message);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            eprintln!(
                "Is the controller running? Start it with: {}",
                "forkscribe controller".bold()
            );
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Print published messages until the controller goes away.
async fn handle_follow(socket_path: PathBuf) -> Result<()> {
    follow(&socket_path, |response| {
        if let Response::Published { message, .. } = response {
            println!("{}", message);
        }
    })
    .await
    .with_context(|| format!("Failed to follow {}", socket_path.display()))?;
    Ok(())
}
