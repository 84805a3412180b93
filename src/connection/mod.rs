//! Connection manager for the server's push channel.
//!
//! Keeps exactly one connection alive: connect, greet, announce the current
//! monitoring flag, forward every parsed message in order, and on any close
//! or error wait a fixed delay and start over. There is no attempt cap.

pub mod transport;

use crate::narration::{ServerMessage, back_state_frame};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use transport::{Connection, Connector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Retrying,
}

/// What the manager reports to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// The connection closed or failed; a retry follows after `retry_in`.
    Closed {
        reason: String,
        at: DateTime<Local>,
        retry_in: Duration,
    },
    Message(ServerMessage),
}

impl ConnectionEvent {
    /// Human-readable status line for a close.
    pub fn status_line(at: &DateTime<Local>, retry_in: Duration, reason: &str) -> String {
        format!(
            "{}: connection closed or error; will retry in {} seconds {}",
            at.format("%H:%M:%S"),
            retry_in.as_secs_f32(),
            reason
        )
    }
}

pub struct ConnectionManager {
    url: String,
    connector: Arc<dyn Connector>,
    reconnect_delay: Duration,
    greeting: Option<String>,
    back: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
        reconnect_delay: Duration,
        greeting: Option<String>,
        back: watch::Receiver<bool>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            connector,
            reconnect_delay,
            greeting,
            back,
            events,
        }
    }

    /// Run until the event receiver is dropped.
    pub async fn run(self) {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            if !self.emit(ConnectionEvent::StateChanged(ConnectionState::Connecting)) {
                break;
            }
            debug!(attempt, url = %self.url, "Connecting");

            let reason = match self.connector.connect(&self.url).await {
                Ok(mut connection) => {
                    info!(url = %self.url, "Connected");
                    let reason = self.serve(connection.as_mut()).await;
                    connection.close().await;
                    reason
                }
                Err(e) => e.to_string(),
            };
            if self.events.is_closed() {
                break;
            }

            let at = Local::now();
            warn!(
                retry_in_ms = self.reconnect_delay.as_millis() as u64,
                "Connection lost: {reason}"
            );
            self.emit(ConnectionEvent::Closed {
                reason,
                at,
                retry_in: self.reconnect_delay,
            });
            self.emit(ConnectionEvent::StateChanged(ConnectionState::Retrying));
            tokio::time::sleep(self.reconnect_delay).await;
        }
        debug!("Connection manager stopped");
    }

    /// Drive one open connection; returns why it ended.
    async fn serve(&self, connection: &mut dyn Connection) -> String {
        if !self.emit(ConnectionEvent::StateChanged(ConnectionState::Connected)) {
            return "session closed".to_string();
        }
        if let Some(greeting) = &self.greeting
            && let Err(e) = connection.send_text(greeting).await
        {
            return e.to_string();
        }
        let back = *self.back.borrow();
        if let Err(e) = connection.send_text(back_state_frame(back)).await {
            return e.to_string();
        }

        while let Some(frame) = connection.next_message().await {
            let payload = match frame {
                Ok(payload) => payload,
                Err(e) => return e.to_string(),
            };
            match ServerMessage::parse(&payload) {
                Ok(message) => {
                    if !self.emit(ConnectionEvent::Message(message)) {
                        return "session closed".to_string();
                    }
                }
                Err(e) => warn!("Dropping server payload: {e}"),
            }
        }
        "closed by server".to_string()
    }

    fn emit(&self, event: ConnectionEvent) -> bool {
        self.events.send(event).is_ok()
    }
}
