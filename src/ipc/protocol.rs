//! JSON line protocol between the CLI and the daemon.

use crate::relay::protocol::RelayEvent;
use crate::session::SessionSnapshot;
use serde::{Deserialize, Serialize};

/// Commands sent by the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    PlayPause,
    Stop,
    Next,
    ToggleFront,
    ToggleBack,
    /// Set playback speed; clamped into the accepted range
    SetSpeed { speed: f32 },
    SpeedUp,
    SpeedDown,
    /// Clear the displayed text
    Clear,
    Status,
    /// Keep the connection open and stream every session event
    Follow,
    Shutdown,
}

impl Command {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Responses sent by the daemon to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Status(SessionSnapshot),
    Speed { speed: f32 },
    /// One streamed session event (only after `follow`)
    Event { event: RelayEvent },
    Error { message: String },
}

impl Response {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
