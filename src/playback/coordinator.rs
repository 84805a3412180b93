//! Playback coordinator: the audio state machine.
//!
//! Every operation is a synchronous transition that returns the effects the
//! session must carry out (fetches, relayed audio commands, server requests,
//! broadcasts). Nothing here awaits, so the outcome of any interleaving of
//! inputs is decided by the order in which the session applies them.
//!
//! Loads are identified by the generation of the admit that started them.
//! A fetch result or device event carrying any other generation is stale
//! and dropped.

use crate::defaults;
use crate::error::{NarratorError, Result};
use crate::narration::NarrationEvent;
use crate::playback::PlaybackState;
use crate::playback::fetch::AudioResource;
use crate::relay::protocol::{AudioCommand, CommandKind, DeviceEvent, DeviceEventKind, RelayEvent};
use tracing::{debug, info, warn};

/// Work requested by a coordinator transition.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Show this text.
    Display(NarrationEvent),
    /// Retrieve audio for `event`; report back with the same generation.
    Fetch {
        generation: u64,
        event: NarrationEvent,
    },
    /// Relay a command to the audio context.
    Audio {
        generation: u64,
        command: AudioCommand,
    },
    /// Ask the server to advance its queue.
    RequestNext,
    /// Push the monitoring flag to the server.
    SetMonitoring(bool),
    Broadcast(RelayEvent),
}

#[derive(Debug)]
pub struct PlaybackCoordinator {
    state: PlaybackState,
    generation: u64,
    /// Text of the most recent load handed to the device.
    last_text: Option<String>,
    /// Generation of the in-flight load, if any.
    pending: Option<u64>,
    /// Play/pause pressed while loading.
    pause_when_ready: bool,
    /// Generation of the source the device holds.
    assigned: Option<u64>,
    speed: f32,
    speed_deferred: bool,
}

impl PlaybackCoordinator {
    pub fn new(speed: f32) -> Self {
        Self {
            state: PlaybackState::Idle,
            generation: 0,
            last_text: None,
            pending: None,
            pause_when_ready: false,
            assigned: None,
            speed: defaults::clamp_speed(speed),
            speed_deferred: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Generation of the load still waiting for its audio.
    pub fn pending_generation(&self) -> Option<u64> {
        self.pending
    }

    /// Effects to run once at session start: push the configured speed,
    /// which also brings up the audio context.
    pub fn startup(&mut self, front: bool) -> Vec<Effect> {
        if front {
            vec![self.audio(AudioCommand::SetSpeed(self.speed))]
        } else {
            self.speed_deferred = true;
            Vec::new()
        }
    }

    /// Accept a narration event from the server.
    pub fn admit(&mut self, event: NarrationEvent, front: bool) -> Vec<Effect> {
        self.generation += 1;
        let generation = self.generation;
        let mut effects = vec![Effect::Display(event.clone())];

        if !front {
            if self.drop_pending() {
                self.transition(PlaybackState::Idle, &mut effects);
            }
            debug!(generation, "Front disabled; showing text without audio");
            return effects;
        }

        let same_text = self.last_text.as_deref() == Some(event.text.as_str());
        if same_text && !matches!(self.state, PlaybackState::Ended | PlaybackState::Error) {
            debug!(generation, "Text repeated; treating as play/pause");
            effects.extend(self.play_pause(front));
            return effects;
        }

        if self.state == PlaybackState::Playing {
            effects.push(self.audio(AudioCommand::Pause));
        }
        if let Some(superseded) = self.pending.replace(generation) {
            debug!(superseded, generation, "Superseding in-flight load");
        }
        self.last_text = Some(event.text.clone());
        self.pause_when_ready = false;
        self.transition(PlaybackState::Loading, &mut effects);
        effects.push(Effect::Fetch { generation, event });
        effects
    }

    pub fn play_pause(&mut self, front: bool) -> Vec<Effect> {
        if !front {
            debug!("Front disabled; play/pause ignored");
            return Vec::new();
        }
        let mut effects = Vec::new();
        match self.state {
            PlaybackState::Playing => {
                effects.push(self.audio(AudioCommand::Pause));
                self.transition(PlaybackState::Paused, &mut effects);
            }
            PlaybackState::Paused => {
                effects.push(self.audio(AudioCommand::Resume));
                self.transition(PlaybackState::Playing, &mut effects);
            }
            PlaybackState::Loading => {
                self.pause_when_ready = !self.pause_when_ready;
                debug!(pause_when_ready = self.pause_when_ready, "Play/pause while loading");
            }
            PlaybackState::Idle | PlaybackState::Ended => {
                if self.assigned.is_some() {
                    self.transition(PlaybackState::Loading, &mut effects);
                    effects.push(self.audio(AudioCommand::Replay));
                    self.transition(PlaybackState::Playing, &mut effects);
                } else {
                    debug!("Nothing to play");
                }
            }
            PlaybackState::Error => debug!("Play/pause ignored after playback error"),
        }
        effects
    }

    /// Pause, rewind and forget any in-flight load.
    pub fn stop(&mut self, front: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.drop_pending();
        if front && self.assigned.is_some() && self.state != PlaybackState::Idle {
            effects.push(self.audio(AudioCommand::Stop));
        }
        self.transition(PlaybackState::Idle, &mut effects);
        effects
    }

    /// Skip the current text. Only meaningful while something is audible.
    pub fn next(&mut self, front: bool) -> Vec<Effect> {
        if !front || self.state != PlaybackState::Playing {
            debug!(state = ?self.state, "Next ignored");
            return Vec::new();
        }
        let mut effects = vec![self.audio(AudioCommand::Stop), Effect::RequestNext];
        self.transition(PlaybackState::Ended, &mut effects);
        effects
    }

    pub fn set_speed(&mut self, speed: f32, front: bool) -> Vec<Effect> {
        self.speed = defaults::clamp_speed(speed);
        let mut effects = vec![Effect::Broadcast(RelayEvent::SpeedChanged { speed: self.speed })];
        if front {
            effects.push(self.audio(AudioCommand::SetSpeed(self.speed)));
        } else {
            self.speed_deferred = true;
        }
        effects
    }

    /// React to the front toggle changing.
    pub fn front_changed(&mut self, front: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        if front {
            if std::mem::take(&mut self.speed_deferred) {
                effects.push(self.audio(AudioCommand::SetSpeed(self.speed)));
            }
            return effects;
        }
        match self.state {
            PlaybackState::Playing => {
                effects.push(self.audio(AudioCommand::Pause));
                self.transition(PlaybackState::Paused, &mut effects);
            }
            PlaybackState::Loading => {
                self.drop_pending();
                self.transition(PlaybackState::Idle, &mut effects);
            }
            _ => {}
        }
        effects
    }

    /// Audio for a load has been retrieved (or failed to be).
    pub fn on_fetched(&mut self, generation: u64, result: Result<AudioResource>) -> Vec<Effect> {
        if self.pending != Some(generation) {
            debug!(generation, pending = ?self.pending, "Discarding stale audio");
            return Vec::new();
        }
        self.pending = None;
        let mut effects = Vec::new();
        match result {
            Ok(resource) => {
                info!(generation, source = %resource.source_url, "Audio ready");
                self.assigned = Some(generation);
                effects.push(Effect::Audio {
                    generation,
                    command: AudioCommand::Start {
                        generation,
                        resource,
                    },
                });
                self.transition(PlaybackState::Playing, &mut effects);
                if std::mem::take(&mut self.pause_when_ready) {
                    effects.push(self.audio(AudioCommand::Pause));
                    self.transition(PlaybackState::Paused, &mut effects);
                }
            }
            Err(error) => {
                warn!(generation, "Audio retrieval failed: {error}");
                self.last_text = None;
                self.transition(PlaybackState::Error, &mut effects);
                effects.push(Effect::RequestNext);
            }
        }
        effects
    }

    /// The audio context acknowledged (or rejected) a relayed command.
    pub fn on_command_outcome(
        &mut self,
        generation: u64,
        kind: CommandKind,
        result: Result<()>,
    ) -> Vec<Effect> {
        let Err(error) = result else {
            return Vec::new();
        };
        if error.is_expected_race() {
            debug!(generation, ?kind, "Play request interrupted by pause");
            return Vec::new();
        }
        if !kind.starts_output() {
            warn!(generation, ?kind, "Audio command failed: {error}");
            return Vec::new();
        }
        let active = self.assigned == Some(generation)
            && matches!(self.state, PlaybackState::Playing | PlaybackState::Paused);
        if !active {
            debug!(generation, ?kind, "Ignoring failure of superseded command: {error}");
            return Vec::new();
        }
        self.fail(generation, &error)
    }

    /// React to the device finishing, stalling on or failing the current
    /// source. A source paused right as it ran out still counts as ended.
    pub fn on_device_event(&mut self, event: DeviceEvent) -> Vec<Effect> {
        let active = self.assigned == Some(event.generation)
            && matches!(self.state, PlaybackState::Playing | PlaybackState::Paused);
        if !active {
            debug!(generation = event.generation, kind = ?event.kind, "Ignoring device event for inactive source");
            return Vec::new();
        }
        let mut effects = Vec::new();
        match event.kind {
            DeviceEventKind::Ended => {
                info!(generation = event.generation, "Narration finished");
                self.transition(PlaybackState::Ended, &mut effects);
            }
            DeviceEventKind::Stalled => {
                warn!(generation = event.generation, "Audio stream stalled; skipping ahead");
                self.transition(PlaybackState::Ended, &mut effects);
            }
            DeviceEventKind::Failed(message) => {
                return self.fail(
                    event.generation,
                    &NarratorError::PlaybackDevice { message },
                );
            }
        }
        effects.push(Effect::RequestNext);
        effects
    }

    fn fail(&mut self, generation: u64, error: &NarratorError) -> Vec<Effect> {
        warn!(generation, "Playback failed: {error}");
        let mut effects = Vec::new();
        self.transition(PlaybackState::Error, &mut effects);
        effects.push(Effect::RequestNext);
        effects
    }

    /// Forget the in-flight load. Returns true if there was one.
    fn drop_pending(&mut self) -> bool {
        self.pause_when_ready = false;
        match self.pending.take() {
            Some(dropped) => {
                debug!(dropped, "Dropping in-flight load");
                self.last_text = None;
                true
            }
            None => false,
        }
    }

    fn audio(&self, command: AudioCommand) -> Effect {
        Effect::Audio {
            generation: self.assigned.unwrap_or(self.generation),
            command,
        }
    }

    fn transition(&mut self, next: PlaybackState, effects: &mut Vec<Effect>) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!(from = ?self.state, to = ?next, "Refusing invalid playback transition");
            return;
        }
        debug!(from = ?self.state, to = ?next, "Playback state changed");
        self.state = next;
        effects.push(Effect::Broadcast(RelayEvent::PlaybackChanged { state: next }));
    }
}
