//! The playback session: one owned aggregate of all client state.
//!
//! [`Session`] is mutated only through its methods, which route to the
//! toggle synchronizer and the playback coordinator and return the effects
//! to carry out. [`runner`] hosts it on a single task and executes those
//! effects.

pub mod runner;

use crate::config::Config;
use crate::connection::{ConnectionEvent, ConnectionState};
use crate::defaults;
use crate::error::Result;
use crate::narration::{NarrationEvent, QueueKind, ServerMessage};
use crate::playback::PlaybackState;
use crate::playback::coordinator::{Effect, PlaybackCoordinator};
use crate::playback::fetch::AudioResource;
use crate::relay::protocol::{CommandKind, DeviceEvent, RelayEvent};
use crate::toggles::{ToggleSynchronizer, back_label};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

/// User intent arriving from the UI surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    PlayPause,
    Stop,
    Next,
    ToggleFront,
    ToggleBack,
    SetSpeed(f32),
    /// Move the speed by this many 0.1 steps.
    StepSpeed(i32),
    Clear,
    Status,
}

/// Point-in-time view of the session for the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub playback: PlaybackState,
    pub front: bool,
    pub back: bool,
    pub speed: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub is_rtl: bool,
    pub generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_queue: Option<String>,
}

#[derive(Debug)]
pub struct Session {
    playback: PlaybackCoordinator,
    toggles: ToggleSynchronizer,
    connection: ConnectionState,
    status_line: Option<String>,
    /// Latest narration admitted to the coordinator.
    current: Option<NarrationEvent>,
    /// What the display shows; cleared independently of `current`.
    display: Option<NarrationEvent>,
    input_queue: Option<String>,
    output_queue: Option<String>,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self {
            playback: PlaybackCoordinator::new(config.playback.speed),
            toggles: ToggleSynchronizer::new(
                config.playback.front_enabled,
                config.playback.back_enabled,
                config.playback.toggle_signal_max_len,
            ),
            connection: ConnectionState::Disconnected,
            status_line: None,
            current: None,
            display: None,
            input_queue: None,
            output_queue: None,
        }
    }

    /// Receiver for the connection manager's handshake.
    pub fn back_receiver(&self) -> watch::Receiver<bool> {
        self.toggles.back_receiver()
    }

    pub fn current(&self) -> Option<&NarrationEvent> {
        self.current.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let toggles = self.toggles.state();
        SessionSnapshot {
            connection: self.connection,
            status: self.status_line.clone(),
            playback: self.playback.state(),
            front: toggles.front,
            back: toggles.back,
            speed: self.playback.speed(),
            text: self.display.as_ref().map(|d| d.text.clone()),
            is_rtl: self.display.as_ref().is_some_and(|d| d.is_rtl),
            generation: self.playback.generation(),
            input_queue: self.input_queue.clone(),
            output_queue: self.output_queue.clone(),
        }
    }

    pub fn startup(&mut self) -> Vec<Effect> {
        self.playback.startup(self.toggles.front())
    }

    /// Update the display; returns the broadcast announcing it.
    pub fn show(&mut self, event: NarrationEvent) -> RelayEvent {
        let update = RelayEvent::TextUpdated {
            text: event.text.clone(),
            is_rtl: event.is_rtl,
        };
        self.display = Some(event);
        update
    }

    pub fn on_connection(&mut self, event: ConnectionEvent) -> Vec<Effect> {
        match event {
            ConnectionEvent::StateChanged(state) => {
                if state == self.connection {
                    return Vec::new();
                }
                self.connection = state;
                if state == ConnectionState::Connected {
                    self.status_line = None;
                }
                vec![self.connection_changed()]
            }
            ConnectionEvent::Closed {
                reason,
                at,
                retry_in,
            } => {
                self.connection = ConnectionState::Retrying;
                self.status_line = Some(ConnectionEvent::status_line(&at, retry_in, &reason));
                vec![self.connection_changed()]
            }
            ConnectionEvent::Message(message) => self.on_server_message(message),
        }
    }

    fn on_server_message(&mut self, message: ServerMessage) -> Vec<Effect> {
        match message {
            ServerMessage::Narration(event) => self.on_narration(event),
            ServerMessage::MonitoringChanged(back) => {
                if self.toggles.adopt_server_back(back) {
                    vec![Effect::Broadcast(RelayEvent::BackToggled {
                        enabled: back,
                        label: back_label(back),
                    })]
                } else {
                    Vec::new()
                }
            }
            ServerMessage::QueueStatus { queue, value } => {
                match queue {
                    QueueKind::Input => self.input_queue = Some(value.clone()),
                    QueueKind::Output => self.output_queue = Some(value.clone()),
                }
                vec![Effect::Broadcast(RelayEvent::QueueStatus { queue, value })]
            }
        }
    }

    fn on_narration(&mut self, event: NarrationEvent) -> Vec<Effect> {
        if self.toggles.is_toggle_signal(&event) {
            debug!(chars = event.char_len(), "Short narration treated as front toggle");
            return self.flip_front();
        }
        info!(chars = event.char_len(), rtl = event.is_rtl, "Narration received");
        self.current = Some(event.clone());
        self.playback.admit(event, self.toggles.front())
    }

    pub fn on_intent(&mut self, intent: Intent) -> Vec<Effect> {
        let front = self.toggles.front();
        match intent {
            Intent::PlayPause => self.playback.play_pause(front),
            Intent::Stop => self.playback.stop(front),
            Intent::Next => self.playback.next(front),
            Intent::ToggleFront => self.flip_front(),
            Intent::ToggleBack => {
                let back = self.toggles.flip_back();
                vec![
                    Effect::Broadcast(RelayEvent::BackToggled {
                        enabled: back,
                        label: back_label(back),
                    }),
                    Effect::SetMonitoring(back),
                ]
            }
            Intent::SetSpeed(speed) => self.playback.set_speed(speed, front),
            Intent::StepSpeed(steps) => {
                let speed = defaults::step_speed(self.playback.speed(), steps);
                self.playback.set_speed(speed, front)
            }
            Intent::Clear => {
                self.display = None;
                vec![Effect::Broadcast(RelayEvent::TextCleared)]
            }
            Intent::Status => Vec::new(),
        }
    }

    pub fn on_fetched(&mut self, generation: u64, result: Result<AudioResource>) -> Vec<Effect> {
        self.playback.on_fetched(generation, result)
    }

    pub fn on_command_outcome(
        &mut self,
        generation: u64,
        kind: CommandKind,
        result: Result<()>,
    ) -> Vec<Effect> {
        self.playback.on_command_outcome(generation, kind, result)
    }

    pub fn on_device_event(&mut self, event: DeviceEvent) -> Vec<Effect> {
        self.playback.on_device_event(event)
    }

    fn flip_front(&mut self) -> Vec<Effect> {
        let front = self.toggles.flip_front();
        let mut effects = vec![Effect::Broadcast(RelayEvent::FrontToggled { enabled: front })];
        effects.extend(self.playback.front_changed(front));
        effects
    }

    fn connection_changed(&self) -> Effect {
        Effect::Broadcast(RelayEvent::ConnectionChanged {
            state: self.connection,
            status: self.status_line.clone(),
        })
    }
}
