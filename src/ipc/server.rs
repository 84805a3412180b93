//! Async Unix socket IPC server for daemon control.

use crate::error::{NarratorError, Result};
use crate::ipc::protocol::{Command, Response};
use crate::relay::Listener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Handler trait for processing IPC commands.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a command and return a response.
    async fn handle(&self, command: Command) -> Response;

    /// Event stream for `follow`; `None` if the handler has none.
    fn subscribe(&self) -> Option<Listener> {
        None
    }
}

/// IPC server for handling daemon control commands via Unix socket.
pub struct IpcServer {
    socket_path: PathBuf,
    shutdown: watch::Sender<bool>,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            socket_path,
            shutdown,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Default socket path based on XDG_RUNTIME_DIR or fallback.
    pub fn default_socket_path() -> PathBuf {
        if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
            PathBuf::from(xdg_runtime).join("narrator.sock")
        } else {
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/narrator-{}.sock", uid))
        }
    }

    /// Bind the socket and serve clients until [`IpcServer::stop`] is called.
    pub async fn start<H>(&self, handler: H) -> Result<()>
    where
        H: CommandHandler + 'static,
    {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| NarratorError::IpcSocket {
                message: format!("Failed to remove existing socket: {}", e),
            })?;
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| NarratorError::IpcSocket {
                message: format!("Failed to bind to socket: {}", e),
            })?;
        debug!(path = %self.socket_path.display(), "IPC server listening");

        let handler = Arc::new(handler);
        let stopped = stopped(self.shutdown.subscribe());
        tokio::pin!(stopped);

        loop {
            tokio::select! {
                _ = &mut stopped => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, handler).await {
                                warn!("Error handling client: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        return Err(NarratorError::IpcConnection {
                            message: format!("Failed to accept connection: {}", e),
                        });
                    }
                },
            }
        }

        debug!("IPC server stopped accepting");
        Ok(())
    }

    /// Stop the IPC server and clean up the socket file.
    pub fn stop(&self) -> Result<()> {
        self.shutdown.send_replace(true);

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| NarratorError::IpcSocket {
                message: format!("Failed to remove socket file: {}", e),
            })?;
        }

        Ok(())
    }
}

/// Resolves once [`IpcServer::stop`] has been called.
async fn stopped(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

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
        .map_err(|e| NarratorError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?;

    let command = match Command::from_json(line.trim()) {
        Ok(command) => command,
        Err(e) => {
            let message = format!("Failed to parse command: {}", e);
            write_response(&mut writer, &Response::Error { message: message.clone() }).await?;
            return Err(NarratorError::IpcProtocol { message });
        }
    };

    if command == Command::Follow {
        return follow(&mut writer, handler.subscribe()).await;
    }

    let response = handler.handle(command).await;
    write_response(&mut writer, &response).await
}

/// Acknowledge, then stream events until the client hangs up.
async fn follow(writer: &mut OwnedWriteHalf, listener: Option<Listener>) -> Result<()> {
    let Some(mut listener) = listener else {
        let response = Response::Error {
            message: "follow is not supported".to_string(),
        };
        return write_response(writer, &response).await;
    };
    write_response(writer, &Response::Ok).await?;
    while let Some(event) = listener.recv().await {
        if let Err(e) = write_response(writer, &Response::Event { event }).await {
            debug!("Follower went away: {e}");
            break;
        }
    }
    Ok(())
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let response_json = response.to_json().map_err(|e| NarratorError::IpcProtocol {
        message: format!("Failed to serialize response: {}", e),
    })?;

    writer
        .write_all(format!("{response_json}\n").as_bytes())
        .await
        .map_err(|e| NarratorError::IpcConnection {
            message: format!("Failed to write to client: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| NarratorError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })
}
