//! Narration events and the server push-channel wire format.
//!
//! [`ServerMessage::parse`] is the only place that knows about the legacy
//! payload shapes; everything past it sees a canonical [`NarrationEvent`].

use crate::error::{NarratorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A text unit pushed by the server, paired with its display direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationEvent {
    pub text: String,
    pub is_rtl: bool,
}

impl NarrationEvent {
    pub fn new(text: impl Into<String>, is_rtl: bool) -> Self {
        Self {
            text: text.into(),
            is_rtl,
        }
    }

    /// Build an event from a bare string, inferring direction from its script.
    pub fn from_legacy(text: impl Into<String>) -> Self {
        let text = text.into();
        let is_rtl = contains_arabic_script(&text);
        Self { text, is_rtl }
    }

    /// Length in characters (not bytes), as used by the toggle-signal rule.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Which server-side queue a [`ServerMessage::QueueStatus`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Input,
    Output,
}

/// Everything the server can push over the streaming connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Narration(NarrationEvent),
    /// Server-originated change of the monitoring (`back`) flag.
    MonitoringChanged(bool),
    /// Fill level of a server queue, e.g. `"3/50"`.
    QueueStatus { queue: QueueKind, value: String },
}

#[derive(Deserialize)]
struct WirePayload {
    action: Option<String>,
    text: Option<String>,
    #[serde(default)]
    is_fa: bool,
    state: Option<bool>,
    value: Option<Value>,
}

impl ServerMessage {
    /// Parse one push-channel payload.
    ///
    /// JSON objects are decoded by their `action`; JSON string literals and
    /// anything that does not decode as JSON are legacy narration. Valid
    /// JSON of any other shape is a [`NarratorError::MalformedEvent`].
    pub fn parse(payload: &str) -> Result<Self> {
        let trimmed = payload.trim_start();
        let looks_structured =
            trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with('"');
        if !looks_structured {
            return Ok(ServerMessage::Narration(NarrationEvent::from_legacy(payload)));
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                debug!("Payload is not JSON ({e}); treating it as legacy text");
                return Ok(ServerMessage::Narration(NarrationEvent::from_legacy(payload)));
            }
        };
        match value {
            Value::String(text) => Ok(ServerMessage::Narration(NarrationEvent::from_legacy(text))),
            Value::Object(_) => {
                let wire: WirePayload =
                    serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;
                Self::from_wire(wire)
            }
            other => Err(malformed(format!("unexpected payload type: {other}"))),
        }
    }

    fn from_wire(wire: WirePayload) -> Result<Self> {
        match wire.action.as_deref() {
            None | Some("new-text") => {
                let text = wire
                    .text
                    .ok_or_else(|| malformed("missing field `text`".to_string()))?;
                Ok(ServerMessage::Narration(NarrationEvent::new(text, wire.is_fa)))
            }
            Some("toggle-monitoring") => {
                let state = wire
                    .state
                    .ok_or_else(|| malformed("missing field `state`".to_string()))?;
                Ok(ServerMessage::MonitoringChanged(state))
            }
            Some(action @ ("input-queue-size" | "output-queue-size")) => {
                let queue = if action.starts_with("input") {
                    QueueKind::Input
                } else {
                    QueueKind::Output
                };
                let value = match wire.value {
                    Some(Value::String(s)) => s,
                    Some(other) => other.to_string(),
                    None => return Err(malformed("missing field `value`".to_string())),
                };
                Ok(ServerMessage::QueueStatus { queue, value })
            }
            Some(other) => Err(malformed(format!("unknown action {other:?}"))),
        }
    }
}

/// Client → server text frame carrying the monitoring flag.
pub fn back_state_frame(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

fn contains_arabic_script(text: &str) -> bool {
    text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c))
}

fn malformed(message: String) -> NarratorError {
    NarratorError::MalformedEvent { message }
}
