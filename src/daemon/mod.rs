//! Daemon mode: hosts the session and serves the IPC control socket.

pub mod handler;

use crate::config::Config;
use crate::connection::transport::WsConnector;
use crate::error::{NarratorError, Result};
use crate::ipc::server::IpcServer;
use crate::playback::fetch::HttpAudioFetcher;
use crate::relay::ContextLauncher;
use crate::server_api::HttpServerApi;
use crate::session::runner::{SessionDeps, start_session};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};

/// Run the daemon: start the session, serve IPC, wait for shutdown.
///
/// Shutdown is triggered by SIGINT, SIGTERM or an IPC `shutdown` command.
pub async fn run_daemon(
    config: Config,
    socket_path: Option<PathBuf>,
    launcher: Arc<dyn ContextLauncher>,
) -> Result<()> {
    config.validate()?;

    let deps = SessionDeps {
        connector: Arc::new(WsConnector),
        fetcher: Arc::new(HttpAudioFetcher::new(
            config.audio_url(),
            config.playback.delivery,
        )),
        server: Arc::new(HttpServerApi::new(config.next_url(), config.monitoring_url())),
        launcher,
    };
    let running = start_session(&config, deps);

    let socket_path = socket_path.unwrap_or_else(IpcServer::default_socket_path);
    let server = Arc::new(IpcServer::new(socket_path));
    info!(socket = %server.socket_path().display(), "Daemon ready");

    let shutdown = Arc::new(Notify::new());
    let handler = handler::DaemonCommandHandler::new(running.handle.clone(), Arc::clone(&shutdown));

    let server_clone = Arc::clone(&server);
    let server_handle = tokio::spawn(async move { server_clone.start(handler).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                error!("Error setting up signal handler: {}", e);
            }
            info!("Received SIGTERM, shutting down");
        }
        _ = shutdown.notified() => info!("Shutting down on request"),
    }

    server.stop()?;
    match server_handle.await {
        Ok(Err(e)) => error!("IPC server failed: {e}"),
        Err(e) => error!("IPC server task failed: {e}"),
        Ok(Ok(())) => {}
    }
    running.shutdown().await;

    info!("Daemon stopped");
    Ok(())
}

/// Launcher that opens the configured rodio output on the audio thread.
#[cfg(feature = "rodio-audio")]
pub fn rodio_launcher(config: &Config) -> Arc<dyn ContextLauncher> {
    use crate::playback::device::AudioDevice;
    use crate::playback::rodio_device::RodioDevice;
    use crate::relay::audio_context::{DeviceFactory, ThreadLauncher};

    let device_name = config.playback.device.clone();
    let speed = config.playback.speed;
    let factory: Arc<DeviceFactory> = Arc::new(move || {
        let device = RodioDevice::open(device_name.as_deref(), speed)?;
        Ok(Box::new(device) as Box<dyn AudioDevice>)
    });
    Arc::new(ThreadLauncher::new(
        factory,
        std::time::Duration::from_millis(crate::defaults::DEVICE_POLL_MS),
    ))
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| NarratorError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<Result<()>>().await
}
