//! IPC client for talking to a running controller.

use crate::error::{ForkscribeError, Result};
use crate::ipc::protocol::{Command, Response};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedReadHalf;

/// Connect and write one command line, returning the response line reader.
async fn open(socket_path: &Path, command: &Command) -> Result<Lines<BufReader<OwnedReadHalf>>> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| ForkscribeError::IpcConnection {
            message: format!("Failed to connect to controller: {}", e),
        })?;

    let (reader, mut writer) = stream.into_split();

    let command_json = command.to_json().map_err(|e| ForkscribeError::IpcProtocol {
        message: format!("Failed to serialize command: {}", e),
    })?;

    writer
        .write_all(command_json.as_bytes())
        .await
        .map_err(|e| ForkscribeError::IpcConnection {
            message: format!("Failed to write command: {}", e),
        })?;

    writer
        .write_all(b"\n")
        .await
        .map_err(|e| ForkscribeError::IpcConnection {
            message: format!("Failed to write newline: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| ForkscribeError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    // One command per connection; half-close so the server sees EOF after it.
    drop(writer);

    Ok(BufReader::new(reader).lines())
}

async fn next_response(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Result<Option<Response>> {
    let line = lines
        .next_line()
        .await
        .map_err(|e| ForkscribeError::IpcConnection {
            message: format!("Failed to read response: {}", e),
        })?;

    line.map(|line| {
        Response::from_json(line.trim()).map_err(|e| ForkscribeError::IpcProtocol {
            message: format!("Failed to deserialize response: {}", e),
        })
    })
    .transpose()
}

/// Send a command to the controller via Unix socket.
///
/// # Errors
/// Returns `ForkscribeError::IpcConnection` if connection fails
/// Returns `ForkscribeError::IpcProtocol` if serialization/deserialization fails
pub async fn send_command(socket_path: &Path, command: Command) -> Result<Response> {
    let mut lines = open(socket_path, &command).await?;
    next_response(&mut lines)
        .await?
        .ok_or_else(|| ForkscribeError::IpcConnection {
            message: "Controller closed the connection without replying".to_string(),
        })
}

/// Subscribe to published messages and hand each one to `on_message` until
/// the controller goes away.
pub async fn follow<F>(socket_path: &Path, mut on_message: F) -> Result<()>
where
    F: FnMut(Response),
{
    let mut lines = open(socket_path, &Command::Subscribe).await?;

    match next_response(&mut lines).await? {
        Some(Response::Ok) => {}
        Some(Response::Error { message }) => {
            return Err(ForkscribeError::IpcProtocol { message });
        }
        Some(other) => {
            return Err(ForkscribeError::IpcProtocol {
                message: format!("Unexpected subscribe reply: {:?}", other),
            });
        }
        None => {
            return Err(ForkscribeError::IpcConnection {
                message: "Controller closed the connection without replying".to_string(),
            });
        }
    }

    while let Some(response) = next_response(&mut lines).await? {
        on_message(response);
    }
    Ok(())
}
