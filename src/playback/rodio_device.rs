//! Audio output through rodio.

use crate::error::{NarratorError, Result};
use crate::playback::device::{AudioDevice, DeviceStatus};
use crate::playback::fetch::AudioResource;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, info};

/// Plays narration audio on a local output device.
///
/// Not `Send`: construct it on the thread that drives it.
pub struct RodioDevice {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Sink,
    resource: Option<AudioResource>,
    speed: f32,
    started: bool,
}

impl RodioDevice {
    /// Open the named output device, or the system default.
    pub fn open(device_name: Option<&str>, speed: f32) -> Result<Self> {
        let (stream, handle) = match device_name {
            Some(name) => {
                let device = find_output_device(name)?;
                OutputStream::try_from_device(&device).map_err(device_error)?
            }
            None => OutputStream::try_default().map_err(device_error)?,
        };
        let sink = Sink::try_new(&handle).map_err(device_error)?;
        sink.pause();
        sink.set_speed(speed);
        info!(device = device_name.unwrap_or("default"), speed, "Audio output opened");
        Ok(Self {
            _stream: stream,
            handle,
            sink,
            resource: None,
            speed,
            started: false,
        })
    }

    /// Replace the sink with a fresh, paused one holding the current source from its start.
    fn rebuild_sink(&mut self) -> Result<()> {
        self.sink.stop();
        let sink = Sink::try_new(&self.handle).map_err(device_error)?;
        sink.pause();
        sink.set_speed(self.speed);
        if let Some(resource) = &self.resource {
            let decoder = Decoder::new(resource.buffer.reader()).map_err(device_error)?;
            sink.append(decoder);
        }
        self.sink = sink;
        self.started = false;
        Ok(())
    }
}

impl AudioDevice for RodioDevice {
    fn assign(&mut self, resource: &AudioResource) -> Result<()> {
        debug!(source = %resource.source_url, "Assigning audio source");
        self.resource = Some(resource.clone());
        self.rebuild_sink()
    }

    fn play(&mut self) -> Result<()> {
        if self.resource.is_none() {
            return Err(NarratorError::PlaybackDevice {
                message: "no source assigned".to_string(),
            });
        }
        if self.started && self.sink.empty() {
            // Playing again after the end starts over, like a media element.
            self.rebuild_sink()?;
        }
        self.sink.play();
        self.started = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn stop(&mut self) -> Result<()> {
        self.rebuild_sink()
    }

    fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
        self.sink.set_speed(speed);
    }

    fn status(&self) -> DeviceStatus {
        if self.resource.is_none() {
            DeviceStatus::Empty
        } else if self.started && self.sink.empty() {
            DeviceStatus::Finished
        } else if self.sink.is_paused() {
            DeviceStatus::Paused
        } else {
            DeviceStatus::Playing
        }
    }
}

/// Names of the available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = rodio::cpal::default_host();
    let devices = host.output_devices().map_err(device_error)?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

fn find_output_device(name: &str) -> Result<rodio::cpal::Device> {
    let host = rodio::cpal::default_host();
    let mut devices = host.output_devices().map_err(device_error)?;
    devices
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| NarratorError::PlaybackDevice {
            message: format!("output device not found: {name}"),
        })
}

fn device_error(e: impl std::fmt::Display) -> NarratorError {
    NarratorError::PlaybackDevice {
        message: e.to_string(),
    }
}
