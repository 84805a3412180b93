//! Error types for narrator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarratorError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Server connection errors
    #[error("Connection closed or failed: {reason}")]
    Connection { reason: String },

    #[error("Malformed narration event: {message}")]
    MalformedEvent { message: String },

    #[error("Server request failed: {message}")]
    ServerRequest { message: String },

    // Playback errors
    #[error("Play request interrupted by a pause")]
    PlaybackInterrupted,

    #[error("Playback device error: {message}")]
    PlaybackDevice { message: String },

    #[error("Audio retrieval failed: {message}")]
    AudioFetch { message: String },

    // Relay errors
    #[error("Relay delivery failed: {message}")]
    RelayDelivery { message: String },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl NarratorError {
    /// True for the play-vs-pause race, which callers swallow instead of reporting.
    pub fn is_expected_race(&self) -> bool {
        matches!(self, NarratorError::PlaybackInterrupted)
    }
}

pub type Result<T> = std::result::Result<T, NarratorError>;
