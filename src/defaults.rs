//! Default configuration constants for narrator.
//!
//! Shared by the config layer, the session and the CLI so the protocol
//! constants live in one place.

/// Base URL of the local narration server.
pub const SERVER_BASE_URL: &str = "http://127.0.0.1:3775";

/// Push channel path (websocket).
pub const WS_PATH: &str = "/ws";

/// Audio endpoint serving the current narration unit.
pub const AUDIO_PATH: &str = "/audio";

/// Flow control endpoint: "I finished, send more".
pub const NEXT_PATH: &str = "/next";

/// State-setting endpoint for the server-side monitoring flag.
pub const MONITORING_PATH: &str = "/monitoring";

/// Fixed delay between a close and the next connection attempt.
///
/// There is no backoff growth and no retry cap.
pub const RECONNECT_DELAY_MS: u64 = 2000;

/// Greeting sent on every successful connect, before the back-state.
pub const GREETING: &str = "hello";

/// Narration texts with fewer characters than this are a front-toggle signal.
pub const TOGGLE_SIGNAL_MAX_LEN: usize = 3;

/// Default playback speed.
pub const PLAYBACK_SPEED: f32 = 2.0;

/// Slowest accepted playback speed.
pub const MIN_SPEED: f32 = 0.1;

/// Fastest accepted playback speed.
pub const MAX_SPEED: f32 = 4.0;

/// Increment used by `speed_up` / `speed_down`.
pub const SPEED_STEP: f32 = 0.1;

/// Upper bound on how long a relayed command waits for its acknowledgment.
///
/// Covers decoding the first bytes of a streamed source, which is why it is generous.
pub const ACK_TIMEOUT_MS: u64 = 10_000;

/// How often the audio context checks whether the current source has finished.
pub const DEVICE_POLL_MS: u64 = 100;

/// Clamp a requested speed into the accepted range.
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        return PLAYBACK_SPEED;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

/// Apply `steps` increments of [`SPEED_STEP`] and round to one decimal.
pub fn step_speed(speed: f32, steps: i32) -> f32 {
    let stepped = speed + SPEED_STEP * steps as f32;
    clamp_speed((stepped * 10.0).round() / 10.0)
}
