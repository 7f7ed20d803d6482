//! Provider proxy bridge: accepts fork streams over WebSocket and relays each
//! one to a provider link of its own.

pub mod handshake;
pub mod negotiate;
pub mod session;
pub mod translate;

pub use handshake::SessionParams;
pub use session::{CloseAction, Endpoint, FrameQueue, ProxySession, classify_close};
pub use translate::{Dropped, ErrorFrame, OutputFrame, ResultTranslator};

use crate::config::BridgeConfig;
use crate::daemon::wait_for_sigterm;
use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

/// Accept fork streams on `listener` until `shutdown` resolves. Sessions
/// already running are left to end with their fork stream.
pub async fn serve<F>(listener: TcpListener, config: BridgeConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let config = Arc::new(config);
    let client = reqwest::Client::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let config = Arc::clone(&config);
                let client = client.clone();
                tokio::spawn(async move {
                    let upstream = match accept_async(stream).await {
                        Ok(upstream) => upstream,
                        Err(e) => {
                            tracing::debug!(%peer, error = %e, "WebSocket upgrade failed");
                            return;
                        }
                    };
                    tracing::info!(%peer, "fork stream connected");
                    match ProxySession::accept(upstream, &config, &client).await {
                        Ok(()) => tracing::info!(%peer, "fork stream closed"),
                        Err(e) => tracing::error!(%peer, error = %e, "bridge session failed"),
                    }
                });
            }
        }
    }

    Ok(())
}

/// Run the bridge until SIGINT or SIGTERM.
pub async fn run_bridge(config: BridgeConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.listen).await?;
    tracing::info!(
        listen = %listener.local_addr()?,
        negotiation = !config.negotiation_url.is_empty(),
        "bridge listening"
    );

    let shutdown = async {
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
    };

    serve(listener, config, shutdown).await?;
    tracing::info!("bridge stopped");
    Ok(())
}
