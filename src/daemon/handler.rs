//! Command handler implementation for the daemon.

use crate::ipc::protocol::{Command, Response};
use crate::ipc::server::CommandHandler;
use crate::relay::Listener;
use crate::session::Intent;
use crate::session::runner::SessionHandle;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Maps IPC commands onto session intents.
pub struct DaemonCommandHandler {
    session: SessionHandle,
    shutdown: Arc<Notify>,
}

impl DaemonCommandHandler {
    /// `shutdown` is notified when a client asks the daemon to exit.
    pub fn new(session: SessionHandle, shutdown: Arc<Notify>) -> Self {
        Self { session, shutdown }
    }

    async fn apply(&self, intent: Intent) -> Response {
        match self.session.intent(intent).await {
            Ok(snapshot) => match intent {
                Intent::Status => Response::Status(snapshot),
                Intent::SetSpeed(_) | Intent::StepSpeed(_) => Response::Speed {
                    speed: snapshot.speed,
                },
                _ => Response::Ok,
            },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::PlayPause => self.apply(Intent::PlayPause).await,
            Command::Stop => self.apply(Intent::Stop).await,
            Command::Next => self.apply(Intent::Next).await,
            Command::ToggleFront => self.apply(Intent::ToggleFront).await,
            Command::ToggleBack => self.apply(Intent::ToggleBack).await,
            Command::SetSpeed { speed } => self.apply(Intent::SetSpeed(speed)).await,
            Command::SpeedUp => self.apply(Intent::StepSpeed(1)).await,
            Command::SpeedDown => self.apply(Intent::StepSpeed(-1)).await,
            Command::Clear => self.apply(Intent::Clear).await,
            Command::Status => self.apply(Intent::Status).await,
            Command::Follow => Response::Error {
                message: "follow is served by the IPC server".to_string(),
            },
            Command::Shutdown => {
                info!("Shutdown requested over IPC");
                self.shutdown.notify_one();
                Response::Ok
            }
        }
    }

    fn subscribe(&self) -> Option<Listener> {
        Some(self.session.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connection::transport::MockConnector;
    use crate::playback::fetch::MockAudioFetcher;
    use crate::relay::MockLauncher;
    use crate::relay::protocol::RelayEvent;
    use crate::server_api::MockServerApi;
    use crate::session::runner::{RunningSession, SessionDeps, start_session};

    fn start() -> RunningSession {
        let config = Config::default();
        start_session(
            &config,
            SessionDeps {
                connector: Arc::new(MockConnector::new()),
                fetcher: Arc::new(MockAudioFetcher::new(&config.audio_url())),
                server: Arc::new(MockServerApi::new()),
                launcher: Arc::new(MockLauncher::new()),
            },
        )
    }

    #[tokio::test]
    async fn test_handler_status() {
        let running = start();
        let handler = DaemonCommandHandler::new(running.handle.clone(), Arc::new(Notify::new()));

        match handler.handle(Command::Status).await {
            Response::Status(snapshot) => {
                assert!(snapshot.front);
                assert!(!snapshot.back);
                assert!((snapshot.speed - 2.0).abs() < f32::EPSILON);
            }
            other => panic!("Expected Status response, got {other:?}"),
        }
        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_handler_speed_commands_report_speed() {
        let running = start();
        let handler = DaemonCommandHandler::new(running.handle.clone(), Arc::new(Notify::new()));

        match handler.handle(Command::SpeedUp).await {
            Response::Speed { speed } => assert!((speed - 2.1).abs() < 1e-6),
            other => panic!("Expected Speed response, got {other:?}"),
        }
        match handler.handle(Command::SetSpeed { speed: 12.0 }).await {
            Response::Speed { speed } => assert!((speed - 4.0).abs() < 1e-6),
            other => panic!("Expected Speed response, got {other:?}"),
        }
        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_handler_toggles_broadcast_to_subscribers() {
        let running = start();
        let handler = DaemonCommandHandler::new(running.handle.clone(), Arc::new(Notify::new()));
        let mut events = handler.subscribe().unwrap();

        assert_eq!(handler.handle(Command::ToggleFront).await, Response::Ok);
        loop {
            match events.recv().await {
                Some(RelayEvent::FrontToggled { enabled }) => {
                    assert!(!enabled);
                    break;
                }
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_handler_shutdown_notifies() {
        let running = start();
        let shutdown = Arc::new(Notify::new());
        let handler = DaemonCommandHandler::new(running.handle.clone(), Arc::clone(&shutdown));

        assert_eq!(handler.handle(Command::Shutdown).await, Response::Ok);
        shutdown.notified().await;
        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_handler_after_session_stopped() {
        let running = start();
        let handle = running.handle.clone();
        running.shutdown().await;

        let handler = DaemonCommandHandler::new(handle, Arc::new(Notify::new()));
        assert!(matches!(
            handler.handle(Command::PlayPause).await,
            Response::Error { .. }
        ));
    }
}
