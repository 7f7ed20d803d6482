//! Async Unix socket server for the controller's control socket.

use crate::error::{ForkscribeError, Result};
use crate::ipc::protocol::{Command, Response};
use crate::store::PublishedMessage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, broadcast};

/// Handler trait for processing control socket commands.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a request/response command.
    async fn handle(&self, command: Command) -> Response;

    /// Feed for `subscribe`; `None` when the handler has nothing to stream.
    fn subscribe(&self) -> Option<broadcast::Receiver<PublishedMessage>> {
        None
    }
}

/// State for managing server shutdown.
#[derive(Debug, Clone)]
struct ServerState {
    shutdown: Arc<Mutex<bool>>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            shutdown: Arc::new(Mutex::new(false)),
        }
    }

    async fn is_shutdown(&self) -> bool {
        *self.shutdown.lock().await
    }

    async fn set_shutdown(&self) {
        *self.shutdown.lock().await = true;
    }
}

/// Control socket server: one JSON command line per connection.
pub struct IpcServer {
    socket_path: PathBuf,
    state: ServerState,
}

impl IpcServer {
    /// Create a new IPC server bound to the specified socket path.
    pub fn new(socket_path: PathBuf) -> Result<Self> {
        Ok(Self {
            socket_path,
            state: ServerState::new(),
        })
    }

    /// Get the socket path this server is using.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Get the default socket path based on XDG_RUNTIME_DIR or fallback.
    pub fn default_socket_path() -> PathBuf {
        if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
            PathBuf::from(xdg_runtime).join("forkscribe.sock")
        } else {
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/forkscribe-{}.sock", uid))
        }
    }

    /// Start the IPC server and handle incoming connections.
    pub async fn start<H>(&self, handler: H) -> Result<()>
    where
        H: CommandHandler + 'static,
    {
        // Clean up any existing socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ForkscribeError::IpcSocket {
                message: format!("Failed to remove existing socket: {}", e),
            })?;
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| ForkscribeError::IpcSocket {
                message: format!("Failed to bind to socket: {}", e),
            })?;

        let handler = Arc::new(handler);

        loop {
            if self.state.is_shutdown().await {
                break;
            }

            // Accept with timeout so the shutdown flag is re-checked
            let accept_result =
                tokio::time::timeout(tokio::time::Duration::from_millis(100), listener.accept())
                    .await;

            match accept_result {
                Ok(Ok((stream, _))) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, handler).await {
                            tracing::debug!(error = %e, "control socket client failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    return Err(ForkscribeError::IpcConnection {
                        message: format!("Failed to accept connection: {}", e),
                    });
                }
                Err(_) => continue,
            }
        }

        Ok(())
    }

    /// Stop the IPC server and clean up the socket file.
    pub async fn stop(&self) -> Result<()> {
        self.state.set_shutdown().await;

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ForkscribeError::IpcSocket {
                message: format!("Failed to remove socket file: {}", e),
            })?;
        }

        Ok(())
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let response_json = response.to_json().map_err(|e| ForkscribeError::IpcProtocol {
        message: format!("Failed to serialize response: {}", e),
    })?;

    writer
        .write_all(response_json.as_bytes())
        .await
        .map_err(|e| ForkscribeError::IpcConnection {
            message: format!("Failed to write to client: {}", e),
        })?;

    writer
        .write_all(b"\n")
        .await
        .map_err(|e| ForkscribeError::IpcConnection {
            message: format!("Failed to write newline to client: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| ForkscribeError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })
}

/// Handle a single client connection.
async fn handle_client<H>(stream: UnixStream, handler: Arc<H>) -> Result<()>
where
    H: CommandHandler,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    reader
        .read_line(&mut line)
        .await
        .map_err(|e| ForkscribeError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?;

    let command = match Command::from_json(line.trim()) {
        Ok(command) => command,
        Err(e) => {
            let response = Response::Error {
                message: format!("Failed to parse command: {}", e),
            };
            write_response(&mut writer, &response).await?;
            return Err(ForkscribeError::IpcProtocol {
                message: format!("Failed to parse command: {}", e),
            });
        }
    };

    if command == Command::Subscribe {
        return stream_published(&mut writer, handler.as_ref()).await;
    }

    let response = handler.handle(command).await;
    write_response(&mut writer, &response).await
}

/// Acknowledge a subscription, then forward published messages until the
/// client hangs up or the feed closes.
async fn stream_published<H>(writer: &mut OwnedWriteHalf, handler: &H) -> Result<()>
where
    H: CommandHandler + ?Sized,
{
    let Some(mut feed) = handler.subscribe() else {
        let response = Response::Error {
            message: "Subscriptions not supported".to_string(),
        };
        return write_response(writer, &response).await;
    };

    write_response(writer, &Response::Ok).await?;

    loop {
        match feed.recv().await {
            Ok(published) => {
                let response = Response::Published {
                    channel: published.channel,
                    message: published.message,
                };
                write_response(writer, &response).await?;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "subscriber fell behind, messages skipped");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    // Mock handler for testing
    struct MockCommandHandler {
        feed: Option<broadcast::Sender<PublishedMessage>>,
    }

    impl MockCommandHandler {
        fn new() -> Self {
            Self { feed: None }
        }
    }

    #[async_trait::async_trait]
    impl CommandHandler for MockCommandHandler {
        async fn handle(&self, command: Command) -> Response {
            match command {
                Command::Status => Response::Status {
                    version: "test".to_string(),
                    esl_connected: false,
                    channels: 0,
                    active: 0,
                    stop_pending: 0,
                    restart_pending: 0,
                },
                Command::Bus { .. } => Response::Ok,
                Command::Subscribe => Response::Error {
                    message: "unreachable".to_string(),
                },
            }
        }

        fn subscribe(&self) -> Option<broadcast::Receiver<PublishedMessage>> {
            self.feed.as_ref().map(broadcast::Sender::subscribe)
        }
    }

    async fn spawn_server(socket_path: PathBuf, handler: MockCommandHandler) {
        tokio::spawn(async move {
            let server = IpcServer::new(socket_path).unwrap();
            server.start(handler).await
        });
        // Give server time to start
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }

    async fn roundtrip(socket_path: &Path, line: &str) -> String {
        let mut stream = UnixStream::connect(socket_path).await.unwrap();
        stream.write_all(line.as_bytes()).await.unwrap();
        let mut response_data = Vec::new();
        stream.read_to_end(&mut response_data).await.unwrap();
        String::from_utf8(response_data).unwrap()
    }

    #[test]
    fn test_default_socket_path_returns_valid_path() {
        let path = IpcServer::default_socket_path();
        let path_str = path.to_string_lossy();
        if std::env::var("XDG_RUNTIME_DIR").is_ok() {
            assert!(path_str.ends_with("forkscribe.sock"));
        } else {
            let uid = unsafe { libc::getuid() };
            assert_eq!(path_str, format!("/tmp/forkscribe-{}.sock", uid));
        }
    }

    #[tokio::test]
    async fn test_server_binds_to_socket() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        spawn_server(socket_path.clone(), MockCommandHandler::new()).await;
        assert!(socket_path.exists());
    }

    #[tokio::test]
    async fn test_status_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        spawn_server(socket_path.clone(), MockCommandHandler::new()).await;

        let response = roundtrip(&socket_path, "{\"type\":\"status\"}\n").await;
        match Response::from_json(response.trim()).unwrap() {
            Response::Status { version, .. } => assert_eq!(version, "test"),
            other => panic!("Expected Status response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_gets_error_response() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        spawn_server(socket_path.clone(), MockCommandHandler::new()).await;

        let response = roundtrip(&socket_path, "not valid json\n").await;
        assert!(matches!(
            Response::from_json(response.trim()).unwrap(),
            Response::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_subscribe_without_feed_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        spawn_server(socket_path.clone(), MockCommandHandler::new()).await;

        let response = roundtrip(&socket_path, "{\"type\":\"subscribe\"}\n").await;
        assert!(matches!(
            Response::from_json(response.trim()).unwrap(),
            Response::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_subscribe_streams_published_messages() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        let (feed, _keep) = broadcast::channel(8);
        spawn_server(
            socket_path.clone(),
            MockCommandHandler {
                feed: Some(feed.clone()),
            },
        )
        .await;

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(b"{\"type\":\"subscribe\"}\n")
            .await
            .unwrap();
        let mut lines = BufReader::new(reader).lines();

        let ack = lines.next_line().await.unwrap().unwrap();
        assert_eq!(Response::from_json(&ack).unwrap(), Response::Ok);

        feed.send(PublishedMessage {
            channel: "chan".to_string(),
            message: json!({ "n": 1 }),
        })
        .unwrap();

        let published = lines.next_line().await.unwrap().unwrap();
        assert_eq!(
            Response::from_json(&published).unwrap(),
            Response::Published {
                channel: "chan".to_string(),
                message: json!({ "n": 1 }),
            }
        );
    }

    #[tokio::test]
    async fn test_server_cleanup_on_stop() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        let server = Arc::new(IpcServer::new(socket_path.clone()).unwrap());

        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.start(MockCommandHandler::new()).await });
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert!(socket_path.exists());

        server.stop().await.unwrap();
        assert!(!socket_path.exists());
        assert!(task.await.unwrap().is_ok());
    }
}
