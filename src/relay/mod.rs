//! Message relay between the session, the audio context and UI listeners.
//!
//! The audio context is created lazily by the first command that needs it.
//! Commands submitted while it is being created are queued and delivered in
//! submission order once it is live. At most one context exists at a time.

pub mod audio_context;
pub mod protocol;

use crate::error::{NarratorError, Result};
use protocol::{AudioCommand, DeviceEvent, Envelope, RelayEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Receiving end handed to a UI listener.
pub type Listener = mpsc::UnboundedReceiver<RelayEvent>;

/// Sending side of a live audio context.
#[derive(Debug, Clone)]
pub struct AudioContextHandle {
    tx: crossbeam_channel::Sender<Envelope>,
}

impl AudioContextHandle {
    pub fn new(tx: crossbeam_channel::Sender<Envelope>) -> Self {
        Self { tx }
    }

    /// Hand the envelope back if the context is gone.
    fn deliver(&self, envelope: Envelope) -> std::result::Result<(), Envelope> {
        self.tx.send(envelope).map_err(|e| e.into_inner())
    }
}

/// Creates audio contexts on demand.
///
/// This trait allows swapping implementations (audio thread vs mock).
#[async_trait::async_trait]
pub trait ContextLauncher: Send + Sync {
    /// Bring up a context that reports device events on `events`.
    async fn launch(&self, events: mpsc::UnboundedSender<DeviceEvent>)
    -> Result<AudioContextHandle>;
}

enum AudioSlot {
    Absent,
    Launching(Vec<Envelope>),
    Live(AudioContextHandle),
}

struct RelayInner {
    listeners: Mutex<Vec<mpsc::UnboundedSender<RelayEvent>>>,
    slot: Mutex<AudioSlot>,
    launcher: Arc<dyn ContextLauncher>,
    device_events: mpsc::UnboundedSender<DeviceEvent>,
    ack_timeout: Duration,
    launches: AtomicUsize,
}

/// Cheaply cloneable relay handle.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

/// Acknowledgment of a submitted command, resolved by the audio context.
#[derive(Debug)]
pub struct PendingAck {
    rx: oneshot::Receiver<Result<()>>,
    timeout: Duration,
}

impl PendingAck {
    pub async fn wait(self) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(NarratorError::RelayDelivery {
                message: "audio context dropped the command".to_string(),
            }),
            Err(_) => Err(NarratorError::RelayDelivery {
                message: format!("no acknowledgment within {:?}", self.timeout),
            }),
        }
    }
}

impl Relay {
    /// Create a relay. The receiver yields device events from whichever
    /// audio context is live.
    pub fn new(
        launcher: Arc<dyn ContextLauncher>,
        ack_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<DeviceEvent>) {
        let (device_events, device_rx) = mpsc::unbounded_channel();
        let relay = Self {
            inner: Arc::new(RelayInner {
                listeners: Mutex::new(Vec::new()),
                slot: Mutex::new(AudioSlot::Absent),
                launcher,
                device_events,
                ack_timeout,
                launches: AtomicUsize::new(0),
            }),
        };
        (relay, device_rx)
    }

    /// Register a UI listener.
    pub fn subscribe(&self) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner.listeners).push(tx);
        rx
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    /// Send `event` to every listener, forgetting those that went away.
    pub fn broadcast(&self, event: RelayEvent) {
        let mut listeners = lock(&self.inner.listeners);
        let before = listeners.len();
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
        if listeners.len() < before {
            debug!(dropped = before - listeners.len(), "Pruned closed listeners");
        }
    }

    /// Number of audio contexts launched so far.
    pub fn launches(&self) -> usize {
        self.inner.launches.load(Ordering::SeqCst)
    }

    pub fn is_audio_live(&self) -> bool {
        matches!(*lock(&self.inner.slot), AudioSlot::Live(_))
    }

    /// Enqueue `command` for the audio context, creating it if needed.
    ///
    /// Enqueueing happens before this returns, so commands submitted in
    /// sequence reach the context in that order.
    pub fn submit(&self, command: AudioCommand) -> PendingAck {
        let (ack, rx) = oneshot::channel();
        let envelope = Envelope { command, ack };
        let mut slot = lock(&self.inner.slot);
        match &mut *slot {
            AudioSlot::Live(handle) => {
                if let Err(envelope) = handle.deliver(envelope) {
                    warn!("Audio context is gone; will recreate on next command");
                    *slot = AudioSlot::Absent;
                    reject(envelope, "audio context is gone");
                }
            }
            AudioSlot::Launching(queue) => queue.push(envelope),
            AudioSlot::Absent => {
                *slot = AudioSlot::Launching(vec![envelope]);
                drop(slot);
                self.spawn_launch();
            }
        }
        PendingAck {
            rx,
            timeout: self.inner.ack_timeout,
        }
    }

    /// Submit `command` and wait for its acknowledgment.
    pub async fn command(&self, command: AudioCommand) -> Result<()> {
        self.submit(command).wait().await
    }

    fn spawn_launch(&self) {
        let inner = Arc::clone(&self.inner);
        inner.launches.fetch_add(1, Ordering::SeqCst);
        info!("Creating audio context");
        tokio::spawn(async move {
            let launch = inner.launcher.launch(inner.device_events.clone());
            let result = match tokio::time::timeout(inner.ack_timeout, launch).await {
                Ok(result) => result,
                Err(_) => Err(NarratorError::RelayDelivery {
                    message: format!("not ready within {:?}", inner.ack_timeout),
                }),
            };
            let mut slot = lock(&inner.slot);
            let queued = match std::mem::replace(&mut *slot, AudioSlot::Absent) {
                AudioSlot::Launching(queued) => queued,
                other => {
                    *slot = other;
                    Vec::new()
                }
            };
            match result {
                Ok(handle) => {
                    debug!(queued = queued.len(), "Audio context live");
                    for envelope in queued {
                        if let Err(envelope) = handle.deliver(envelope) {
                            reject(envelope, "audio context exited while starting");
                        }
                    }
                    *slot = AudioSlot::Live(handle);
                }
                Err(e) => {
                    warn!("Failed to create audio context: {e}");
                    let reason = format!("audio context could not be created: {e}");
                    for envelope in queued {
                        reject(envelope, &reason);
                    }
                }
            }
        });
    }
}

fn reject(envelope: Envelope, reason: &str) {
    let _ = envelope.ack.send(Err(NarratorError::RelayDelivery {
        message: reason.to_string(),
    }));
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock launcher for testing
///
/// Each launch spawns a task that acknowledges every command with `Ok`
/// (or with the configured failure) and records what it received.
#[derive(Clone, Default)]
pub struct MockLauncher {
    received: Arc<Mutex<Vec<protocol::CommandKind>>>,
    launches: Arc<AtomicUsize>,
    fail_launch: bool,
    hang_launch: bool,
    hold_acks: bool,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail every launch
    pub fn with_launch_failure(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    /// Configure the mock to never finish launching
    pub fn with_hanging_launch(mut self) -> Self {
        self.hang_launch = true;
        self
    }

    /// Configure the mock context to never acknowledge
    pub fn with_silent_context(mut self) -> Self {
        self.hold_acks = true;
        self
    }

    pub fn received(&self) -> Vec<protocol::CommandKind> {
        lock(&self.received).clone()
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ContextLauncher for MockLauncher {
    async fn launch(
        &self,
        _events: mpsc::UnboundedSender<DeviceEvent>,
    ) -> Result<AudioContextHandle> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.hang_launch {
            std::future::pending::<()>().await;
        }
        if self.fail_launch {
            return Err(NarratorError::PlaybackDevice {
                message: "mock launch failure".to_string(),
            });
        }
        let (tx, rx) = crossbeam_channel::unbounded::<Envelope>();
        let received = Arc::clone(&self.received);
        let hold_acks = self.hold_acks;
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for envelope in rx {
                lock(&received).push(envelope.command.kind());
                if hold_acks {
                    held.push(envelope.ack);
                } else {
                    let _ = envelope.ack.send(Ok(()));
                }
            }
        });
        Ok(AudioContextHandle::new(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::CommandKind;

    fn relay_with(launcher: &MockLauncher, timeout: Duration) -> Relay {
        let (relay, _events) = Relay::new(Arc::new(launcher.clone()), timeout);
        relay
    }

    #[tokio::test]
    async fn first_command_launches_context_once() {
        let launcher = MockLauncher::new();
        let relay = relay_with(&launcher, Duration::from_secs(5));

        let first = relay.submit(AudioCommand::SetSpeed(2.0));
        let second = relay.submit(AudioCommand::Pause);
        let third = relay.submit(AudioCommand::Resume);
        assert_eq!(relay.launches(), 1);

        first.wait().await.unwrap();
        second.wait().await.unwrap();
        third.wait().await.unwrap();

        relay.command(AudioCommand::Stop).await.unwrap();
        assert_eq!(launcher.launches(), 1);
        assert!(relay.is_audio_live());
        assert_eq!(
            launcher.received(),
            vec![
                CommandKind::SetSpeed,
                CommandKind::Pause,
                CommandKind::Resume,
                CommandKind::Stop
            ]
        );
    }

    #[tokio::test]
    async fn failed_launch_rejects_queued_commands_and_retries_later() {
        let launcher = MockLauncher::new().with_launch_failure();
        let relay = relay_with(&launcher, Duration::from_secs(5));

        let first = relay.submit(AudioCommand::SetSpeed(2.0));
        let second = relay.submit(AudioCommand::Pause);
        assert!(matches!(
            first.wait().await,
            Err(NarratorError::RelayDelivery { .. })
        ));
        assert!(matches!(
            second.wait().await,
            Err(NarratorError::RelayDelivery { .. })
        ));
        assert!(!relay.is_audio_live());

        let third = relay.command(AudioCommand::Pause).await;
        assert!(third.is_err());
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_context_times_out() {
        let launcher = MockLauncher::new().with_silent_context();
        let relay = relay_with(&launcher, Duration::from_millis(500));

        let result = relay.command(AudioCommand::Pause).await;
        match result {
            Err(NarratorError::RelayDelivery { message }) => {
                assert!(message.contains("no acknowledgment"));
            }
            other => panic!("Expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_launch_is_abandoned_and_retried() {
        let launcher = MockLauncher::new().with_hanging_launch();
        let relay = relay_with(&launcher, Duration::from_millis(500));

        let first = relay.submit(AudioCommand::SetSpeed(2.0));
        let second = relay.submit(AudioCommand::Pause);
        assert!(matches!(
            first.wait().await,
            Err(NarratorError::RelayDelivery { .. })
        ));
        assert!(matches!(
            second.wait().await,
            Err(NarratorError::RelayDelivery { .. })
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!relay.is_audio_live());
        assert_eq!(relay.launches(), 1);

        let third = relay.submit(AudioCommand::Resume);
        assert_eq!(relay.launches(), 2);
        assert!(third.wait().await.is_err());
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_launch_reports_why() {
        let launcher = MockLauncher::new().with_hanging_launch();
        let relay = relay_with(&launcher, Duration::from_millis(200));
        // Read the raw ack so only the launch timeout can resolve it.
        let PendingAck { rx, .. } = relay.submit(AudioCommand::Pause);

        match tokio::time::timeout(Duration::from_secs(1), rx).await {
            Ok(Ok(Err(NarratorError::RelayDelivery { message }))) => {
                assert!(message.contains("could not be created"), "message: {message}");
                assert!(message.contains("not ready within"), "message: {message}");
            }
            other => panic!("Expected a launch timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_listeners_and_prunes_closed() {
        let launcher = MockLauncher::new();
        let relay = relay_with(&launcher, Duration::from_secs(5));
        let mut a = relay.subscribe();
        let b = relay.subscribe();
        assert_eq!(relay.listener_count(), 2);

        drop(b);
        relay.broadcast(RelayEvent::TextCleared);
        assert_eq!(a.recv().await, Some(RelayEvent::TextCleared));
        assert_eq!(relay.listener_count(), 1);
    }

    #[tokio::test]
    async fn broadcast_without_listeners_is_noop() {
        let relay = relay_with(&MockLauncher::new(), Duration::from_secs(5));
        relay.broadcast(RelayEvent::FrontToggled { enabled: false });
        assert_eq!(relay.launches(), 0);
    }
}
