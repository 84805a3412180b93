//! The audio context: a dedicated thread that owns the audio device.
//!
//! Output devices are not `Send`, so the device is built on the context
//! thread and only ever touched there. Commands arrive over a crossbeam
//! channel and are acknowledged through their envelope; between commands
//! the thread polls the device and reports when the source runs out.

use crate::error::{NarratorError, Result};
use crate::playback::device::{AudioDevice, DeviceStatus};
use crate::playback::fetch::AudioResource;
use crate::relay::protocol::{AudioCommand, DeviceEvent, DeviceEventKind, Envelope};
use crate::relay::{AudioContextHandle, ContextLauncher};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Builds the device inside the context thread.
pub type DeviceFactory = dyn Fn() -> Result<Box<dyn AudioDevice>> + Send + Sync;

/// Launches each audio context on its own thread.
pub struct ThreadLauncher {
    factory: Arc<DeviceFactory>,
    poll_interval: Duration,
}

impl ThreadLauncher {
    pub fn new(factory: Arc<DeviceFactory>, poll_interval: Duration) -> Self {
        Self {
            factory,
            poll_interval,
        }
    }
}

#[async_trait::async_trait]
impl ContextLauncher for ThreadLauncher {
    async fn launch(
        &self,
        events: mpsc::UnboundedSender<DeviceEvent>,
    ) -> Result<AudioContextHandle> {
        let (tx, rx) = crossbeam_channel::unbounded::<Envelope>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let factory = Arc::clone(&self.factory);
        let poll_interval = self.poll_interval;

        std::thread::Builder::new()
            .name("narrator-audio".to_string())
            .spawn(move || {
                let device = match factory() {
                    Ok(device) => device,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                AudioContext::new(device, rx, events, poll_interval).run();
            })?;

        ready_rx.await.map_err(|_| NarratorError::RelayDelivery {
            message: "audio context exited during start-up".to_string(),
        })??;
        info!("Audio context started");
        Ok(AudioContextHandle::new(tx))
    }
}

struct AudioContext {
    device: Box<dyn AudioDevice>,
    inbox: Receiver<Envelope>,
    backlog: VecDeque<Envelope>,
    events: mpsc::UnboundedSender<DeviceEvent>,
    poll_interval: Duration,
    generation: Option<u64>,
    resource: Option<AudioResource>,
    /// Set while output should be audible; cleared once the end is reported.
    watching: bool,
}

impl AudioContext {
    fn new(
        device: Box<dyn AudioDevice>,
        inbox: Receiver<Envelope>,
        events: mpsc::UnboundedSender<DeviceEvent>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            device,
            inbox,
            backlog: VecDeque::new(),
            events,
            poll_interval,
            generation: None,
            resource: None,
            watching: false,
        }
    }

    fn run(mut self) {
        loop {
            let envelope = match self.backlog.pop_front() {
                Some(envelope) => envelope,
                None => match self.inbox.recv_timeout(self.poll_interval) {
                    Ok(envelope) => envelope,
                    Err(RecvTimeoutError::Timeout) => {
                        self.poll_device();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
            };
            let result = self.execute(envelope.command);
            if let Err(e) = &result
                && !e.is_expected_race()
            {
                warn!("Audio command failed: {e}");
            }
            let _ = envelope.ack.send(result);
            self.poll_device();
        }
        debug!("Audio context shutting down");
        self.device.pause();
    }

    fn execute(&mut self, command: AudioCommand) -> Result<()> {
        match command {
            AudioCommand::Start {
                generation,
                resource,
            } => self.start(generation, resource),
            AudioCommand::Pause => {
                self.device.pause();
                self.watching = false;
                Ok(())
            }
            AudioCommand::Resume => {
                self.device.play()?;
                self.watching = true;
                Ok(())
            }
            AudioCommand::Stop => {
                self.watching = false;
                self.device.stop()
            }
            AudioCommand::Replay => {
                self.device.stop()?;
                self.device.play()?;
                self.watching = true;
                Ok(())
            }
            AudioCommand::SetSpeed(speed) => {
                self.device.set_speed(speed);
                Ok(())
            }
        }
    }

    /// Assign the new source and play it, unless a pause or stop is already
    /// queued behind this command: then the play request counts as
    /// interrupted and the source stays paused.
    fn start(&mut self, generation: u64, resource: AudioResource) -> Result<()> {
        self.watching = false;
        self.generation = None;
        self.resource = None;
        self.device.assign(&resource)?;
        self.generation = Some(generation);
        self.resource = Some(resource);

        self.backlog.extend(self.inbox.try_iter());
        let interrupted = self
            .backlog
            .iter()
            .any(|e| matches!(e.command, AudioCommand::Pause | AudioCommand::Stop));
        if interrupted {
            debug!(generation, "Start interrupted by queued pause");
            return Err(NarratorError::PlaybackInterrupted);
        }
        self.device.play()?;
        self.watching = true;
        Ok(())
    }

    fn poll_device(&mut self) {
        if !self.watching {
            return;
        }
        let Some(generation) = self.generation else {
            return;
        };
        let kind = match self.device.status() {
            DeviceStatus::Finished => {
                let stalled = self.resource.as_ref().is_some_and(|r| r.is_stalled());
                if stalled {
                    DeviceEventKind::Stalled
                } else {
                    DeviceEventKind::Ended
                }
            }
            DeviceStatus::Empty => DeviceEventKind::Failed("source vanished".to_string()),
            DeviceStatus::Playing | DeviceStatus::Paused => return,
        };
        self.watching = false;
        debug!(generation, ?kind, "Device event");
        if self.events.send(DeviceEvent { generation, kind }).is_err() {
            error!("Session is gone; dropping device event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::device::{DeviceCall, MockAudioDevice, MockDeviceProbe};
    use crate::playback::stream_buffer::StreamBuffer;

    fn launcher(probe: &MockDeviceProbe) -> ThreadLauncher {
        let probe = probe.clone();
        let factory: Arc<DeviceFactory> = Arc::new(move || {
            Ok(Box::new(MockAudioDevice::new(probe.clone())) as Box<dyn AudioDevice>)
        });
        ThreadLauncher::new(factory, Duration::from_millis(5))
    }

    fn start(generation: u64, url: &str) -> AudioCommand {
        AudioCommand::Start {
            generation,
            resource: AudioResource::new(url, StreamBuffer::from_bytes(vec![0; 4])),
        }
    }

    fn send(handle: &AudioContextHandle, command: AudioCommand) -> oneshot::Receiver<Result<()>> {
        let (ack, rx) = oneshot::channel();
        handle
            .deliver(Envelope { command, ack })
            .unwrap_or_else(|_| panic!("context gone"));
        rx
    }

    #[tokio::test]
    async fn start_plays_and_reports_end() {
        let probe = MockDeviceProbe::default();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let handle = launcher(&probe).launch(events_tx).await.unwrap();

        send(&handle, start(7, "mock://a")).await.unwrap().unwrap();
        assert_eq!(
            probe.calls(),
            vec![
                DeviceCall::Assign {
                    source_url: "mock://a".to_string()
                },
                DeviceCall::Play
            ]
        );

        probe.finish_current();
        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            DeviceEvent {
                generation: 7,
                kind: DeviceEventKind::Ended
            }
        );
    }

    #[tokio::test]
    async fn start_with_pause_queued_is_interrupted() {
        let probe = MockDeviceProbe::default();
        let (events_tx, _events) = mpsc::unbounded_channel();
        let handle = launcher(&probe).launch(events_tx).await.unwrap();

        // Both are queued before the thread picks up the start.
        let (start_ack, start_rx) = oneshot::channel();
        let (pause_ack, pause_rx) = oneshot::channel();
        handle
            .deliver(Envelope {
                command: start(1, "mock://a"),
                ack: start_ack,
            })
            .unwrap_or_else(|_| panic!("context gone"));
        handle
            .deliver(Envelope {
                command: AudioCommand::Pause,
                ack: pause_ack,
            })
            .unwrap_or_else(|_| panic!("context gone"));

        let start_result = start_rx.await.unwrap();
        pause_rx.await.unwrap().unwrap();

        // Whether the start saw the pause depends on thread timing; either
        // way the device must end up paused and never report an end.
        match start_result {
            Err(e) => assert!(e.is_expected_race()),
            Ok(()) => assert!(probe.calls().contains(&DeviceCall::Play)),
        }
        assert_eq!(probe.calls().last(), Some(&DeviceCall::Pause));
    }

    #[tokio::test]
    async fn failing_factory_fails_launch() {
        let factory: Arc<DeviceFactory> = Arc::new(|| {
            Err(NarratorError::PlaybackDevice {
                message: "no output device".to_string(),
            })
        });
        let launcher = ThreadLauncher::new(factory, Duration::from_millis(5));
        let (events_tx, _events) = mpsc::unbounded_channel();
        let result = launcher.launch(events_tx).await;
        assert!(matches!(result, Err(NarratorError::PlaybackDevice { .. })));
    }

    #[tokio::test]
    async fn assign_failure_is_reported() {
        let probe = MockDeviceProbe::default();
        let device_probe = probe.clone();
        let factory: Arc<DeviceFactory> = Arc::new(move || {
            Ok(Box::new(MockAudioDevice::new(device_probe.clone()).with_assign_failure())
                as Box<dyn AudioDevice>)
        });
        let launcher = ThreadLauncher::new(factory, Duration::from_millis(5));
        let (events_tx, _events) = mpsc::unbounded_channel();
        let handle = launcher.launch(events_tx).await.unwrap();

        let result = send(&handle, start(1, "mock://bad")).await.unwrap();
        assert!(matches!(result, Err(NarratorError::PlaybackDevice { .. })));
        assert!(!probe.calls().contains(&DeviceCall::Play));
    }

    #[tokio::test]
    async fn replay_restarts_current_source() {
        let probe = MockDeviceProbe::default();
        let (events_tx, _events) = mpsc::unbounded_channel();
        let handle = launcher(&probe).launch(events_tx).await.unwrap();

        send(&handle, start(1, "mock://a")).await.unwrap().unwrap();
        send(&handle, AudioCommand::Stop).await.unwrap().unwrap();
        send(&handle, AudioCommand::Replay).await.unwrap().unwrap();
        send(&handle, AudioCommand::SetSpeed(1.5)).await.unwrap().unwrap();

        let calls = probe.calls();
        assert_eq!(
            &calls[2..],
            &[
                DeviceCall::Stop,
                DeviceCall::Stop,
                DeviceCall::Play,
                DeviceCall::SetSpeed(1.5)
            ]
        );
    }
}
