//! IPC client for sending commands to the daemon.

use crate::error::{NarratorError, Result};
use crate::ipc::protocol::{Command, Response};
use crate::relay::protocol::RelayEvent;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedReadHalf;

/// Send a command to the daemon and read its single response line.
///
/// # Errors
/// Returns `NarratorError::IpcConnection` if the connection fails
/// Returns `NarratorError::IpcProtocol` if serialization/deserialization fails
pub async fn send_command(socket_path: &Path, command: Command) -> Result<Response> {
    let mut lines = open(socket_path, &command).await?;
    next_response(&mut lines)
        .await?
        .ok_or_else(|| NarratorError::IpcConnection {
            message: "Daemon closed the connection without responding".to_string(),
        })
}

/// Subscribe to the daemon's session events, calling `on_event` for each
/// until the daemon goes away.
pub async fn follow<F>(socket_path: &Path, mut on_event: F) -> Result<()>
where
    F: FnMut(RelayEvent),
{
    let mut lines = open(socket_path, &Command::Follow).await?;
    match next_response(&mut lines).await? {
        Some(Response::Ok) => {}
        Some(Response::Error { message }) => return Err(NarratorError::IpcProtocol { message }),
        other => {
            return Err(NarratorError::IpcProtocol {
                message: format!("Unexpected follow response: {other:?}"),
            });
        }
    }
    while let Some(response) = next_response(&mut lines).await? {
        if let Response::Event { event } = response {
            on_event(event);
        }
    }
    Ok(())
}

async fn open(socket_path: &Path, command: &Command) -> Result<Lines<BufReader<OwnedReadHalf>>> {
    let stream =
        UnixStream::connect(socket_path)
            .await
            .map_err(|e| NarratorError::IpcConnection {
                message: format!("Failed to connect to daemon: {}", e),
            })?;

    let (reader, mut writer) = stream.into_split();

    let command_json = command.to_json().map_err(|e| NarratorError::IpcProtocol {
        message: format!("Failed to serialize command: {}", e),
    })?;

    writer
        .write_all(format!("{command_json}\n").as_bytes())
        .await
        .map_err(|e| NarratorError::IpcConnection {
            message: format!("Failed to write command: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| NarratorError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    // Dropping the write half only shuts down our direction; replies still arrive.
    Ok(BufReader::new(reader).lines())
}

async fn next_response(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Result<Option<Response>> {
    let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| NarratorError::IpcConnection {
            message: format!("Failed to read response: {}", e),
        })?
    else {
        return Ok(None);
    };
    Response::from_json(line.trim())
        .map(Some)
        .map_err(|e| NarratorError::IpcProtocol {
            message: format!("Failed to deserialize response: {}", e),
        })
}
