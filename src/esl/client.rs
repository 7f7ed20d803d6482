//! Event socket connection and the fork commander built on it.

use crate::config::EslConfig;
use crate::controller::{ControllerEvent, ForkCommander};
use crate::error::{ForkscribeError, Result};
use crate::esl::event::{subscription, translate};
use crate::esl::frame::{EslFrame, parse_event_plain, read_frame};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;

type ReplyQueue = Arc<Mutex<VecDeque<oneshot::Sender<EslFrame>>>>;

/// An authenticated, subscribed event socket connection.
///
/// Replies to `api` commands arrive in the order the commands were sent, so
/// each command queues a oneshot that the reader task completes.
pub struct EslConnection {
    writer: Mutex<OwnedWriteHalf>,
    replies: ReplyQueue,
}

impl EslConnection {
    /// Connect, authenticate and subscribe. Translated events are sent on
    /// `events`; the returned task ends when the connection drops.
    pub async fn connect(
        config: &EslConfig,
        events: mpsc::UnboundedSender<ControllerEvent>,
    ) -> Result<(Self, JoinHandle<()>)> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let greeting = expect_frame(&mut reader).await?;
        if greeting.content_type() != Some("auth/request") {
            return Err(ForkscribeError::EslProtocol {
                message: format!("unexpected greeting {:?}", greeting.content_type()),
            });
        }

        send(&mut writer, &format!("auth {}", config.password)).await?;
        let reply = expect_frame(&mut reader).await?;
        if !reply.reply_text().starts_with("+OK") {
            return Err(ForkscribeError::EslAuth {
                message: reply.reply_text().to_string(),
            });
        }

        send(&mut writer, &subscription()).await?;
        let reply = expect_frame(&mut reader).await?;
        if !reply.reply_text().starts_with("+OK") {
            return Err(ForkscribeError::EslProtocol {
                message: format!("subscription refused: {}", reply.reply_text()),
            });
        }

        let replies: ReplyQueue = Arc::new(Mutex::new(VecDeque::new()));
        let task = tokio::spawn(read_loop(reader, Arc::clone(&replies), events));

        Ok((
            Self {
                writer: Mutex::new(writer),
                replies,
            },
            task,
        ))
    }

    /// Run an `api` command and return the response body.
    pub async fn api(&self, command: &str) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        {
            let mut writer = self.writer.lock().await;
            self.replies.lock().await.push_back(tx);
            tracing::debug!(command, "sending event socket command");
            send(&mut writer, &format!("api {}", command)).await?;
        }
        let reply = rx.await.map_err(|_| ForkscribeError::EslDisconnected)?;
        Ok(reply.body.unwrap_or_default())
    }
}

async fn send(writer: &mut OwnedWriteHalf, command: &str) -> Result<()> {
    writer.write_all(command.as_bytes()).await?;
    writer.write_all(b"\n\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn expect_frame(reader: &mut BufReader<OwnedReadHalf>) -> Result<EslFrame> {
    read_frame(reader)
        .await?
        .ok_or(ForkscribeError::EslDisconnected)
}

async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    replies: ReplyQueue,
    events: mpsc::UnboundedSender<ControllerEvent>,
) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "event socket read failed");
                break;
            }
        };

        match frame.content_type() {
            Some("api/response") | Some("command/reply") => {
                match replies.lock().await.pop_front() {
                    Some(waiter) => {
                        if waiter.send(frame).is_err() {
                            tracing::trace!("command caller went away before its reply");
                        }
                    }
                    None => tracing::debug!("unsolicited event socket reply"),
                }
            }
            Some("text/event-plain") => {
                let event = parse_event_plain(frame.body.as_deref().unwrap_or_default());
                if let Some(event) = translate(&event)
                    && events.send(event).is_err()
                {
                    tracing::debug!("controller gone, closing event socket reader");
                    break;
                }
            }
            Some("text/disconnect-notice") => {
                tracing::info!("event socket disconnect notice");
                break;
            }
            other => tracing::trace!(content_type = ?other, "ignoring event socket frame"),
        }
    }
    // Dropping queued senders fails every in-flight command.
    replies.lock().await.clear();
}

/// `-ERR` replies are failures, except the "no reply" form the fork module
/// gives for commands that succeeded silently.
pub fn check_reply(reply: &str) -> Result<()> {
    let reply = reply.trim();
    if reply.starts_with("-ERR") && !reply.contains("no reply") {
        return Err(ForkscribeError::ForkCommand {
            reply: reply.to_string(),
        });
    }
    Ok(())
}

/// Fork commander backed by whichever event socket connection is live.
#[derive(Default)]
pub struct EslCommander {
    connection: RwLock<Option<Arc<EslConnection>>>,
}

impl EslCommander {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, connection: Arc<EslConnection>) {
        *self.connection.write().await = Some(connection);
    }

    pub async fn detach(&self) {
        *self.connection.write().await = None;
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.read().await.is_some()
    }
}

#[async_trait::async_trait]
impl ForkCommander for EslCommander {
    async fn execute(&self, command: &str) -> Result<()> {
        let connection = self
            .connection
            .read()
            .await
            .clone()
            .ok_or(ForkscribeError::EslDisconnected)?;
        let reply = connection.api(command).await?;
        tracing::debug!(command, reply = reply.trim(), "event socket command reply");
        check_reply(&reply)
    }
}

/// Keep an event socket connection up until the controller goes away,
/// reconnecting every `reconnect_interval_ms` after a failure or drop.
pub async fn run_event_link(
    config: EslConfig,
    events: mpsc::UnboundedSender<ControllerEvent>,
    commander: Arc<EslCommander>,
) {
    let interval = Duration::from_millis(config.reconnect_interval_ms);
    loop {
        match EslConnection::connect(&config, events.clone()).await {
            Ok((connection, reader)) => {
                tracing::info!(host = config.host, port = config.port, "connected to event socket");
                commander.attach(Arc::new(connection)).await;
                if let Err(e) = reader.await {
                    tracing::warn!(error = %e, "event socket reader task failed");
                }
                commander.detach().await;
                tracing::error!("event socket connection dropped");
            }
            Err(e) => {
                tracing::warn!(
                    host = config.host,
                    port = config.port,
                    error = %e,
                    retry_ms = config.reconnect_interval_ms,
                    "failed to connect to event socket"
                );
            }
        }

        if events.is_closed() {
            break;
        }
        tokio::time::sleep(interval).await;
    }
}
