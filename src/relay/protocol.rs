//! Message schema between the session, the audio context and UI listeners.

use crate::connection::ConnectionState;
use crate::error::Result;
use crate::narration::QueueKind;
use crate::playback::PlaybackState;
use crate::playback::fetch::AudioResource;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Command addressed to the audio context.
#[derive(Debug, Clone)]
pub enum AudioCommand {
    /// Assign `resource` and play it from the start.
    Start {
        generation: u64,
        resource: AudioResource,
    },
    Pause,
    Resume,
    /// Pause and rewind.
    Stop,
    /// Play the assigned source again from the start.
    Replay,
    SetSpeed(f32),
}

impl AudioCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            AudioCommand::Start { .. } => CommandKind::Start,
            AudioCommand::Pause => CommandKind::Pause,
            AudioCommand::Resume => CommandKind::Resume,
            AudioCommand::Stop => CommandKind::Stop,
            AudioCommand::Replay => CommandKind::Replay,
            AudioCommand::SetSpeed(_) => CommandKind::SetSpeed,
        }
    }
}

/// Payload-free tag of an [`AudioCommand`], used to route acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Start,
    Pause,
    Resume,
    Stop,
    Replay,
    SetSpeed,
}

impl CommandKind {
    /// Commands whose failure leaves nothing audible.
    pub fn starts_output(self) -> bool {
        matches!(
            self,
            CommandKind::Start | CommandKind::Resume | CommandKind::Replay
        )
    }
}

/// A command on its way to the audio context, with its reply slot.
#[derive(Debug)]
pub struct Envelope {
    pub command: AudioCommand,
    pub ack: oneshot::Sender<Result<()>>,
}

/// How the current source stopped producing sound on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEventKind {
    Ended,
    /// The audio body broke off before the end.
    Stalled,
    Failed(String),
}

/// Device notification, tagged with the generation of the source it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub generation: u64,
    pub kind: DeviceEventKind,
}

/// Session change broadcast to every UI listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RelayEvent {
    TextUpdated {
        text: String,
        is_rtl: bool,
    },
    TextCleared,
    FrontToggled {
        enabled: bool,
    },
    BackToggled {
        enabled: bool,
        label: String,
    },
    PlaybackChanged {
        state: PlaybackState,
    },
    ConnectionChanged {
        state: ConnectionState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    QueueStatus {
        queue: QueueKind,
        value: String,
    },
    SpeedChanged {
        speed: f32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_event_wire_shape() {
        let json = serde_json::to_string(&RelayEvent::PlaybackChanged {
            state: PlaybackState::Playing,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"playback_changed","state":"playing"}"#);

        let json = serde_json::to_string(&RelayEvent::ConnectionChanged {
            state: ConnectionState::Connected,
            status: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"connection_changed","state":"connected"}"#);
    }

    #[test]
    fn only_output_commands_start_output() {
        assert!(CommandKind::Start.starts_output());
        assert!(CommandKind::Replay.starts_output());
        assert!(!CommandKind::Pause.starts_output());
        assert!(!CommandKind::SetSpeed.starts_output());
    }
}
