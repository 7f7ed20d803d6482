//! Controller process: event socket link, channel controller and control socket.

pub mod handler;

use crate::config::Config;
use crate::controller::{ChannelController, ControllerStatus};
use crate::error::{ForkscribeError, Result};
use crate::esl::{EslCommander, run_event_link};
use crate::ipc::server::IpcServer;
use crate::store::{EventBus, MemoryStore, SettingsGateway};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Run the controller until SIGINT or SIGTERM.
///
/// The settings store and bus live in this process; bus traffic reaches it
/// through the control socket (`bus` to inject, `subscribe` to follow).
pub async fn run_controller(config: Config, socket_path: Option<PathBuf>) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let bus: Arc<dyn EventBus> = store.clone();
    let settings = SettingsGateway::new(store);
    let commander = Arc::new(EslCommander::new());

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(ControllerStatus::default());

    let controller = ChannelController::new(
        &config,
        settings,
        Arc::clone(&bus),
        commander.clone(),
        events_tx.clone(),
    );
    let controller_handle = tokio::spawn(controller.run(events_rx, status_tx));

    let link_handle = tokio::spawn(run_event_link(
        config.esl.clone(),
        events_tx.clone(),
        Arc::clone(&commander),
    ));

    let socket_path = socket_path
        .or_else(|| config.controller.socket.clone())
        .unwrap_or_else(IpcServer::default_socket_path);
    let server = Arc::new(IpcServer::new(socket_path)?);
    tracing::info!(socket = %server.socket_path().display(), "control socket listening");

    let handler = handler::ControllerCommandHandler::new(events_tx, status_rx, bus, commander);

    let server_clone = Arc::clone(&server);
    let server_handle = tokio::spawn(async move { server_clone.start(handler).await });

    tracing::info!(
        esl = format!("{}:{}", config.esl.host, config.esl.port),
        "controller ready"
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "signal handler setup failed");
            }
            tracing::info!("received SIGTERM, shutting down");
        }
    }

    server.stop().await?;

    match server_handle.await {
        Ok(Err(e)) => tracing::warn!(error = %e, "control socket server stopped with an error"),
        Err(e) => tracing::error!(error = %e, "control socket task failed"),
        Ok(Ok(())) => {}
    }
    link_handle.abort();
    controller_handle.abort();

    tracing::info!("controller stopped");
    Ok(())
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
pub(crate) async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
        ForkscribeError::Other(format!("Failed to register SIGTERM handler: {}", e))
    })?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix, just wait forever (Ctrl+C will still work)
    std::future::pending::<()>().await
}
