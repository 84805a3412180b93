//! Single-task host for the [`Session`] and executor of its effects.
//!
//! Everything that mutates the session funnels through one `select!` loop:
//! connection events, device events, UI intents and the completions of the
//! fetches and relayed commands the loop itself spawned. Suspension only
//! happens in those spawned tasks, never while the session is borrowed.

use crate::config::Config;
use crate::connection::transport::Connector;
use crate::connection::{ConnectionEvent, ConnectionManager};
use crate::error::{NarratorError, Result};
use crate::playback::coordinator::Effect;
use crate::playback::fetch::{AudioFetcher, AudioResource};
use crate::relay::protocol::{CommandKind, DeviceEvent};
use crate::relay::{ContextLauncher, Listener, Relay};
use crate::server_api::ServerApi;
use crate::session::{Intent, Session, SessionSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The collaborators a session talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub connector: Arc<dyn Connector>,
    pub fetcher: Arc<dyn AudioFetcher>,
    pub server: Arc<dyn ServerApi>,
    pub launcher: Arc<dyn ContextLauncher>,
}

enum SessionInput {
    Intent {
        intent: Intent,
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Fetched {
        generation: u64,
        result: Result<AudioResource>,
    },
    CommandOutcome {
        generation: u64,
        kind: CommandKind,
        result: Result<()>,
    },
    Shutdown,
}

/// Cloneable handle used by the UI surface.
#[derive(Clone)]
pub struct SessionHandle {
    inputs: mpsc::UnboundedSender<SessionInput>,
    relay: Relay,
}

impl SessionHandle {
    /// Apply `intent` and return the resulting snapshot.
    pub async fn intent(&self, intent: Intent) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.inputs
            .send(SessionInput::Intent { intent, reply })
            .map_err(|_| session_gone())?;
        rx.await.map_err(|_| session_gone())
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.intent(Intent::Status).await
    }

    /// Listen to every broadcast from now on.
    pub fn subscribe(&self) -> Listener {
        self.relay.subscribe()
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }
}

fn session_gone() -> NarratorError {
    NarratorError::Other("session is not running".to_string())
}

/// A started session and the tasks backing it.
pub struct RunningSession {
    pub handle: SessionHandle,
    runner: JoinHandle<()>,
    connection: JoinHandle<()>,
}

impl RunningSession {
    /// Stop the connection manager and the session loop.
    pub async fn shutdown(self) {
        self.connection.abort();
        let _ = self.handle.inputs.send(SessionInput::Shutdown);
        if let Err(e) = self.runner.await {
            warn!("Session task ended abnormally: {e}");
        }
        info!("Session stopped");
    }
}

/// Create the session and start connecting immediately.
pub fn start_session(config: &Config, deps: SessionDeps) -> RunningSession {
    let session = Session::new(config);
    let (relay, device_events) = Relay::new(
        Arc::clone(&deps.launcher),
        Duration::from_millis(config.relay.ack_timeout_ms),
    );
    let (connection_tx, connection_events) = mpsc::unbounded_channel();
    let manager = ConnectionManager::new(
        config.ws_url(),
        Arc::clone(&deps.connector),
        Duration::from_millis(config.connection.reconnect_delay_ms),
        config.connection.greeting.clone(),
        session.back_receiver(),
        connection_tx,
    );
    let (inputs_tx, inputs) = mpsc::unbounded_channel();

    let runner = SessionRunner {
        session,
        relay: relay.clone(),
        fetcher: deps.fetcher,
        server: deps.server,
        inputs,
        inputs_tx: inputs_tx.clone(),
        connection_events,
        device_events,
    };

    info!(url = %config.ws_url(), "Starting session");
    let runner = tokio::spawn(runner.run());
    let connection = tokio::spawn(manager.run());
    RunningSession {
        handle: SessionHandle {
            inputs: inputs_tx,
            relay,
        },
        runner,
        connection,
    }
}

struct SessionRunner {
    session: Session,
    relay: Relay,
    fetcher: Arc<dyn AudioFetcher>,
    server: Arc<dyn ServerApi>,
    inputs: mpsc::UnboundedReceiver<SessionInput>,
    inputs_tx: mpsc::UnboundedSender<SessionInput>,
    connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    device_events: mpsc::UnboundedReceiver<DeviceEvent>,
}

impl SessionRunner {
    async fn run(mut self) {
        let effects = self.session.startup();
        self.execute(effects);

        loop {
            tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(SessionInput::Shutdown) | None => break,
                    Some(input) => self.handle(input),
                },
                Some(event) = self.connection_events.recv() => {
                    let effects = self.session.on_connection(event);
                    self.execute(effects);
                }
                Some(event) = self.device_events.recv() => {
                    let effects = self.session.on_device_event(event);
                    self.execute(effects);
                }
            }
        }
        debug!("Session loop finished");
    }

    fn handle(&mut self, input: SessionInput) {
        match input {
            SessionInput::Intent { intent, reply } => {
                debug!(?intent, "UI intent");
                let effects = self.session.on_intent(intent);
                self.execute(effects);
                let _ = reply.send(self.session.snapshot());
            }
            SessionInput::Fetched { generation, result } => {
                let effects = self.session.on_fetched(generation, result);
                self.execute(effects);
            }
            SessionInput::CommandOutcome {
                generation,
                kind,
                result,
            } => {
                let effects = self.session.on_command_outcome(generation, kind, result);
                self.execute(effects);
            }
            SessionInput::Shutdown => {}
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Display(event) => {
                    let update = self.session.show(event);
                    self.relay.broadcast(update);
                }
                Effect::Broadcast(event) => self.relay.broadcast(event),
                Effect::Fetch { generation, event } => {
                    let fetcher = Arc::clone(&self.fetcher);
                    let inputs = self.inputs_tx.clone();
                    tokio::spawn(async move {
                        let result = fetcher.fetch(&event).await;
                        let _ = inputs.send(SessionInput::Fetched { generation, result });
                    });
                }
                Effect::Audio {
                    generation,
                    command,
                } => {
                    let kind = command.kind();
                    let pending = self.relay.submit(command);
                    let inputs = self.inputs_tx.clone();
                    tokio::spawn(async move {
                        let result = pending.wait().await;
                        let _ = inputs.send(SessionInput::CommandOutcome {
                            generation,
                            kind,
                            result,
                        });
                    });
                }
                Effect::RequestNext => {
                    let server = Arc::clone(&self.server);
                    tokio::spawn(async move {
                        if let Err(e) = server.request_next().await {
                            warn!("Next request failed: {e}");
                        }
                    });
                }
                Effect::SetMonitoring(enabled) => {
                    let server = Arc::clone(&self.server);
                    tokio::spawn(async move {
                        if let Err(e) = server.set_monitoring(enabled).await {
                            warn!(enabled, "Monitoring update failed: {e}");
                        }
                    });
                }
            }
        }
    }
}
