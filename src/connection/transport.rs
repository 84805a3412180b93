//! Push-channel transport: websocket client plus a scripted mock.

use crate::error::{NarratorError, Result};
use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// One open connection. Dropping it releases everything bound to it.
#[async_trait::async_trait]
pub trait Connection: Send {
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Next text payload; `None` once the peer is gone, `Some(Err)` on a
    /// transport error or close frame.
    async fn next_message(&mut self) -> Option<Result<String>>;

    async fn close(&mut self);
}

/// Opens connections to the push channel.
///
/// This trait allows swapping implementations (websocket vs mock).
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}

/// Websocket transport built on tokio-tungstenite.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        let (stream, response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| NarratorError::Connection {
                    reason: e.to_string(),
                })?;
        debug!(status = %response.status(), "Websocket handshake complete");
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl Connection for WsConnection {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.stream
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(|e| NarratorError::Connection {
                reason: e.to_string(),
            })
    }

    async fn next_message(&mut self) -> Option<Result<String>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => {
                    return Some(Err(NarratorError::Connection {
                        reason: e.to_string(),
                    }));
                }
            };
            match message {
                Message::Text(text) => return Some(Ok(text.as_str().to_owned())),
                Message::Binary(bytes) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| format!("closed by server ({}) {}", f.code, f.reason.as_str()))
                        .unwrap_or_else(|| "closed by server".to_string());
                    return Some(Err(NarratorError::Connection { reason }));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Websocket close: {e}");
        }
    }
}

/// Frame pushed by the test side of a [`MockConnector`] connection.
#[derive(Debug, Clone)]
enum PeerFrame {
    Text(String),
    Close(String),
}

enum Script {
    Refuse(String),
    Accept {
        frames: mpsc::UnboundedReceiver<PeerFrame>,
        sent: Arc<Mutex<Vec<String>>>,
    },
}

#[derive(Default)]
struct MockConnectorState {
    scripts: VecDeque<Script>,
    attempts: Vec<tokio::time::Instant>,
}

/// Mock connector for testing
///
/// Each connect attempt consumes the next scripted outcome; with nothing
/// scripted the attempt is refused.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockConnectorState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next connect attempt.
    pub fn refuse_next(&self, reason: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.scripts.push_back(Script::Refuse(reason.to_string()));
        }
    }

    /// Accept the next connect attempt; the returned peer drives it.
    pub fn accept_next(&self) -> MockPeer {
        let (tx, frames) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        if let Ok(mut state) = self.state.lock() {
            state.scripts.push_back(Script::Accept {
                frames,
                sent: Arc::clone(&sent),
            });
        }
        MockPeer { tx, sent }
    }

    /// When each connect attempt happened.
    pub fn attempts(&self) -> Vec<tokio::time::Instant> {
        self.state
            .lock()
            .map(|s| s.attempts.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Connection>> {
        let script = {
            let mut state = self.state.lock().map_err(|_| NarratorError::Connection {
                reason: "mock state poisoned".to_string(),
            })?;
            state.attempts.push(tokio::time::Instant::now());
            state.scripts.pop_front()
        };
        match script {
            Some(Script::Accept { frames, sent }) => Ok(Box::new(MockConnection { frames, sent })),
            Some(Script::Refuse(reason)) => Err(NarratorError::Connection { reason }),
            None => Err(NarratorError::Connection {
                reason: "connection refused".to_string(),
            }),
        }
    }
}

struct MockConnection {
    frames: mpsc::UnboundedReceiver<PeerFrame>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl Connection for MockConnection {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(text.to_string());
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Result<String>> {
        match self.frames.recv().await? {
            PeerFrame::Text(text) => Some(Ok(text)),
            PeerFrame::Close(reason) => Some(Err(NarratorError::Connection { reason })),
        }
    }

    async fn close(&mut self) {
        self.frames.close();
    }
}

/// Server side of one mock connection.
#[derive(Clone)]
pub struct MockPeer {
    tx: mpsc::UnboundedSender<PeerFrame>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl MockPeer {
    /// Push a text payload to the client.
    pub fn push(&self, payload: &str) {
        let _ = self.tx.send(PeerFrame::Text(payload.to_string()));
    }

    /// Drop the connection with `reason`.
    pub fn close(&self, reason: &str) {
        let _ = self.tx.send(PeerFrame::Close(reason.to_string()));
    }

    /// Frames the client sent on this connection.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}
