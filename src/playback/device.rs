//! The audio output seam.
//!
//! An [`AudioDevice`] lives inside the audio context thread and is only ever
//! driven by that thread in response to relayed commands.

use crate::error::{NarratorError, Result};
use crate::playback::fetch::AudioResource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// What the device is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// No source assigned.
    Empty,
    Playing,
    Paused,
    /// The assigned source played to its end.
    Finished,
}

/// Trait for audio output devices.
///
/// This trait allows swapping implementations (rodio output vs mock).
pub trait AudioDevice {
    /// Assign a new source, replacing the current one. Leaves playback paused.
    fn assign(&mut self, resource: &AudioResource) -> Result<()>;

    /// Start or resume playback of the assigned source.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Pause and rewind the assigned source to its start.
    fn stop(&mut self) -> Result<()>;

    fn set_speed(&mut self, speed: f32);

    fn status(&self) -> DeviceStatus;
}

/// A call observed by [`MockAudioDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Assign { source_url: String },
    Play,
    Pause,
    Stop,
    SetSpeed(f32),
}

/// Test-side view of a [`MockAudioDevice`] living in another thread.
#[derive(Debug, Clone, Default)]
pub struct MockDeviceProbe {
    calls: Arc<Mutex<Vec<DeviceCall>>>,
    finished: Arc<AtomicBool>,
}

impl MockDeviceProbe {
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Sources assigned so far, in order.
    pub fn assigned_sources(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::Assign { source_url } => Some(source_url),
                _ => None,
            })
            .collect()
    }

    /// Simulate the current source reaching its end.
    pub fn finish_current(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: DeviceCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

/// Mock audio device for testing
#[derive(Debug, Default)]
pub struct MockAudioDevice {
    probe: MockDeviceProbe,
    assigned: bool,
    playing: bool,
    fail_assign: bool,
    fail_play: bool,
}

impl MockAudioDevice {
    pub fn new(probe: MockDeviceProbe) -> Self {
        Self {
            probe,
            ..Default::default()
        }
    }

    /// Configure the mock to fail on assign
    pub fn with_assign_failure(mut self) -> Self {
        self.fail_assign = true;
        self
    }

    /// Configure the mock to fail on play
    pub fn with_play_failure(mut self) -> Self {
        self.fail_play = true;
        self
    }
}

impl AudioDevice for MockAudioDevice {
    fn assign(&mut self, resource: &AudioResource) -> Result<()> {
        self.probe.record(DeviceCall::Assign {
            source_url: resource.source_url.clone(),
        });
        if self.fail_assign {
            return Err(NarratorError::PlaybackDevice {
                message: "mock decode failure".to_string(),
            });
        }
        self.probe.finished.store(false, Ordering::SeqCst);
        self.assigned = true;
        self.playing = false;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.probe.record(DeviceCall::Play);
        if self.fail_play {
            return Err(NarratorError::PlaybackDevice {
                message: "mock output failure".to_string(),
            });
        }
        if !self.assigned {
            return Err(NarratorError::PlaybackDevice {
                message: "no source assigned".to_string(),
            });
        }
        self.probe.finished.store(false, Ordering::SeqCst);
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.probe.record(DeviceCall::Pause);
        self.playing = false;
    }

    fn stop(&mut self) -> Result<()> {
        self.probe.record(DeviceCall::Stop);
        self.playing = false;
        self.probe.finished.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_speed(&mut self, speed: f32) {
        self.probe.record(DeviceCall::SetSpeed(speed));
    }

    fn status(&self) -> DeviceStatus {
        if !self.assigned {
            DeviceStatus::Empty
        } else if self.playing && self.probe.finished.load(Ordering::SeqCst) {
            DeviceStatus::Finished
        } else if self.playing {
            DeviceStatus::Playing
        } else {
            DeviceStatus::Paused
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::stream_buffer::StreamBuffer;

    fn resource() -> AudioResource {
        AudioResource::new("mock://audio", StreamBuffer::from_bytes(vec![1, 2, 3]))
    }

    #[test]
    fn mock_device_tracks_status() {
        let probe = MockDeviceProbe::default();
        let mut device = MockAudioDevice::new(probe.clone());
        assert_eq!(device.status(), DeviceStatus::Empty);

        device.assign(&resource()).unwrap();
        assert_eq!(device.status(), DeviceStatus::Paused);

        device.play().unwrap();
        assert_eq!(device.status(), DeviceStatus::Playing);

        probe.finish_current();
        assert_eq!(device.status(), DeviceStatus::Finished);

        assert_eq!(probe.assigned_sources(), vec!["mock://audio".to_string()]);
        assert_eq!(probe.calls().len(), 2);
    }

    #[test]
    fn mock_device_play_without_source_fails() {
        let mut device = MockAudioDevice::new(MockDeviceProbe::default());
        assert!(matches!(
            device.play(),
            Err(NarratorError::PlaybackDevice { .. })
        ));
    }

    #[test]
    fn mock_device_configured_failures() {
        let mut device = MockAudioDevice::new(MockDeviceProbe::default()).with_assign_failure();
        assert!(device.assign(&resource()).is_err());

        let mut device = MockAudioDevice::new(MockDeviceProbe::default()).with_play_failure();
        device.assign(&resource()).unwrap();
        assert!(device.play().is_err());
    }
}
