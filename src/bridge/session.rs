//! One bridged fork stream ↔ provider connection pair.

use crate::bridge::handshake::SessionParams;
use crate::bridge::negotiate::negotiate;
use crate::bridge::translate::{ErrorFrame, ResultTranslator};
use crate::config::BridgeConfig;
use crate::defaults;
use crate::error::{ForkscribeError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::json;
use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Downstream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type DownstreamSink = SplitSink<Downstream, Message>;

/// What to do when the provider closes the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Provider fault: tell the fork stream, then end the session.
    ForwardError(u16),
    /// Normal close: end the session.
    Finish,
    /// Anything else: reopen the provider link.
    Reconnect,
}

/// `None` is a close without a status, e.g. a dropped connection.
pub fn classify_close(code: Option<u16>) -> CloseAction {
    match code {
        Some(code) if code >= defaults::PROVIDER_FAULT_CLOSE_CODE => CloseAction::ForwardError(code),
        Some(1000) => CloseAction::Finish,
        _ => CloseAction::Reconnect,
    }
}

/// Frames waiting for the provider link, oldest first.
///
/// A frame leaves the queue only once it was written, so a link that drops
/// mid-flush resumes with the first unsent frame.
#[derive(Debug, Default)]
pub struct FrameQueue {
    frames: VecDeque<Message>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Message) {
        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Send queued frames in order until empty or the sink fails.
    pub async fn flush<S>(&mut self, sink: &mut S) -> std::result::Result<usize, S::Error>
    where
        S: Sink<Message> + Unpin,
    {
        let mut sent = 0;
        while let Some(frame) = self.frames.front() {
            sink.send(frame.clone()).await?;
            self.frames.pop_front();
            sent += 1;
        }
        Ok(sent)
    }
}

/// Audio chunk wrapped the way the provider expects it.
pub fn audio_envelope(chunk: &[u8]) -> String {
    json!({
        "type": "audio_chunk",
        "data": { "chunk": STANDARD.encode(chunk) },
    })
    .to_string()
}

/// Where the provider link goes, and what to send first on every open.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub url: String,
    pub preamble: Option<String>,
}

impl Endpoint {
    /// Negotiate a live session, or use the direct provider URL (handshake
    /// forwarded as the first frame) when no negotiation endpoint is set.
    pub async fn resolve(
        client: &reqwest::Client,
        config: &BridgeConfig,
        params: &SessionParams,
    ) -> Result<Self> {
        if config.negotiation_url.is_empty() {
            return Ok(Self {
                url: config.provider_url.clone(),
                preamble: Some(params.forwarded.to_string()),
            });
        }

        let url = negotiate(client, config, params).await?;
        Ok(Self {
            url,
            preamble: None,
        })
    }
}

enum Upstream {
    Queued,
    Ignored,
    Closed(Option<CloseFrame>),
}

enum Outcome {
    Done,
    Reconnect,
}

/// A fork stream bridged to one provider link.
pub struct ProxySession<S> {
    upstream_tx: SplitSink<WebSocketStream<S>, Message>,
    upstream_rx: SplitStream<WebSocketStream<S>>,
    pending: FrameQueue,
    translator: ResultTranslator,
    /// Resolved once per fork stream; reopens reuse it.
    endpoint: Endpoint,
    retry_delay: Duration,
}

impl<S> ProxySession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Read the handshake, set up the provider endpoint and relay until
    /// either side ends the session.
    pub async fn accept(
        upstream: WebSocketStream<S>,
        config: &BridgeConfig,
        client: &reqwest::Client,
    ) -> Result<()> {
        let (mut upstream_tx, mut upstream_rx) = upstream.split();

        let Some(handshake) = read_handshake(&mut upstream_rx).await? else {
            tracing::debug!("fork stream closed before its handshake");
            return Ok(());
        };
        let params = SessionParams::from_handshake(&handshake)?;
        let opened_at_ms = now_ms();
        tracing::debug!(
            language = params.language.as_deref().unwrap_or("auto"),
            partials = params.partial_utterances,
            sample_rate = params.sample_rate,
            "fork handshake"
        );

        let endpoint = match Endpoint::resolve(client, config, &params).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                let frame = CloseFrame {
                    code: CloseCode::Error,
                    reason: "provider negotiation failed".into(),
                };
                if let Err(close_err) = upstream_tx.send(Message::Close(Some(frame))).await {
                    tracing::debug!(error = %close_err, "failed to close fork stream");
                }
                return Err(e);
            }
        };

        let session = ProxySession {
            upstream_tx,
            upstream_rx,
            pending: FrameQueue::new(),
            translator: ResultTranslator::new(config, &params, opened_at_ms),
            endpoint,
            retry_delay: Duration::from_millis(defaults::BRIDGE_RECONNECT_MS),
        };
        session.run().await
    }

    async fn run(mut self) -> Result<()> {
        let mut reconnecting = false;
        loop {
            let Some(downstream) = self.connect(reconnecting).await else {
                tracing::debug!(dropped = self.pending.len(), "fork stream closed while connecting");
                return Ok(());
            };
            tracing::debug!(queued = self.pending.len(), "provider link open");

            match self.relay(downstream).await? {
                Outcome::Done => {
                    if let Err(e) = self.upstream_tx.close().await {
                        tracing::trace!(error = %e, "fork stream already closed");
                    }
                    return Ok(());
                }
                Outcome::Reconnect => {
                    tracing::info!(queued = self.pending.len(), "reopening provider link");
                    reconnecting = true;
                }
            }
        }
    }

    /// Open the provider link, queueing upstream frames meanwhile. `None`
    /// when the fork stream ends first. Only a first open is immediate.
    async fn connect(&mut self, reconnecting: bool) -> Option<Downstream> {
        let mut failures = 0u32;
        loop {
            let delay = if failures == 0 && !reconnecting {
                Duration::ZERO
            } else {
                self.retry_delay
            };
            let url = self.endpoint.url.clone();
            let connecting = async move {
                tokio::time::sleep(delay).await;
                connect_async(url).await
            };
            tokio::pin!(connecting);

            loop {
                tokio::select! {
                    result = &mut connecting => {
                        match result {
                            Ok((downstream, _)) => return Some(downstream),
                            Err(e) => {
                                failures += 1;
                                tracing::warn!(
                                    error = %e,
                                    failures,
                                    queued = self.pending.len(),
                                    "provider connection failed"
                                );
                            }
                        }
                        break;
                    }
                    message = self.upstream_rx.next() => {
                        if let Upstream::Closed(_) = self.on_upstream(message) {
                            return None;
                        }
                    }
                }
            }
        }
    }

    async fn relay(&mut self, downstream: Downstream) -> Result<Outcome> {
        let (mut down_tx, mut down_rx) = downstream.split();

        if let Some(preamble) = &self.endpoint.preamble
            && let Err(e) = down_tx.send(Message::Text(preamble.clone().into())).await
        {
            tracing::warn!(error = %e, "failed to send handshake to provider");
            return Ok(Outcome::Reconnect);
        }
        if let Err(e) = self.pending.flush(&mut down_tx).await {
            tracing::warn!(error = %e, queued = self.pending.len(), "provider link failed while flushing");
            return Ok(Outcome::Reconnect);
        }

        loop {
            tokio::select! {
                message = self.upstream_rx.next() => match self.on_upstream(message) {
                    Upstream::Queued => {
                        if let Err(e) = self.pending.flush(&mut down_tx).await {
                            tracing::warn!(error = %e, "provider link failed while sending");
                            return Ok(Outcome::Reconnect);
                        }
                    }
                    Upstream::Ignored => {}
                    Upstream::Closed(frame) => {
                        close_downstream(&mut down_tx, frame).await;
                        return Ok(Outcome::Done);
                    }
                },
                message = down_rx.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if !self.on_provider_frame(text.as_str()).await {
                            close_downstream(&mut down_tx, None).await;
                            return Ok(Outcome::Done);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|frame| u16::from(frame.code));
                        return self.on_provider_close(code).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "provider link error");
                        return Ok(Outcome::Reconnect);
                    }
                    None => {
                        tracing::warn!("provider link ended without a close frame");
                        return Ok(Outcome::Reconnect);
                    }
                },
            }
        }
    }

    fn on_upstream(
        &mut self,
        message: Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) -> Upstream {
        match message {
            Some(Ok(Message::Binary(chunk))) => {
                self.pending
                    .push(Message::Text(audio_envelope(&chunk).into()));
                Upstream::Queued
            }
            // Control messages from the fork (e.g. the end-of-session payload)
            Some(Ok(Message::Text(text))) => {
                self.pending.push(Message::Text(text));
                Upstream::Queued
            }
            Some(Ok(Message::Close(frame))) => Upstream::Closed(frame),
            Some(Ok(_)) => Upstream::Ignored,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "fork stream error");
                Upstream::Closed(None)
            }
            None => Upstream::Closed(None),
        }
    }

    /// Translate and forward one provider frame. `false` once the fork
    /// stream can no longer be written.
    async fn on_provider_frame(&mut self, raw: &str) -> bool {
        let frame = match self.translator.translate(raw) {
            Ok(frame) => frame,
            Err(reason) => {
                tracing::trace!(?reason, "provider frame dropped");
                return true;
            }
        };

        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode result frame");
                return true;
            }
        };

        match self.upstream_tx.send(Message::Text(json.into())).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "fork stream gone");
                false
            }
        }
    }

    async fn on_provider_close(&mut self, code: Option<u16>) -> Result<Outcome> {
        match classify_close(code) {
            CloseAction::ForwardError(code) => {
                tracing::warn!(code, "provider closed with a fault");
                let error = serde_json::to_string(&ErrorFrame::provider_fault(code))?;
                if let Err(e) = self.upstream_tx.send(Message::Text(error.into())).await {
                    tracing::debug!(error = %e, "failed to forward provider fault");
                }
                self.close_upstream().await;
                Ok(Outcome::Done)
            }
            CloseAction::Finish => {
                tracing::info!("provider ended the session");
                self.close_upstream().await;
                Ok(Outcome::Done)
            }
            CloseAction::Reconnect => {
                tracing::warn!(code, "provider link closed unexpectedly");
                Ok(Outcome::Reconnect)
            }
        }
    }

    async fn close_upstream(&mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        if let Err(e) = self.upstream_tx.send(Message::Close(Some(frame))).await {
            tracing::debug!(error = %e, "failed to close fork stream");
        }
    }
}

/// Mirror the fork stream's close onto the provider link.
async fn close_downstream(down_tx: &mut DownstreamSink, upstream: Option<CloseFrame>) {
    let code = upstream
        .map(|frame| u16::from(frame.code))
        .filter(|code| sendable_close_code(*code))
        .unwrap_or(1000);
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: "".into(),
    };
    if let Err(e) = down_tx.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "failed to close provider link");
    }
}

/// Codes that may appear in a close frame on the wire.
fn sendable_close_code(code: u16) -> bool {
    matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
}

async fn read_handshake<S>(upstream_rx: &mut SplitStream<WebSocketStream<S>>) -> Result<Option<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = upstream_rx.next().await {
        match message? {
            Message::Text(text) => return Ok(Some(text.as_str().to_string())),
            Message::Binary(bytes) => {
                return String::from_utf8(bytes.to_vec())
                    .map(Some)
                    .map_err(|_| ForkscribeError::Handshake {
                        message: "first frame is binary audio".to_string(),
                    });
            }
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
