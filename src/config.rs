use crate::defaults;
use crate::error::{NarratorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub connection: ConnectionConfig,
    pub playback: PlaybackConfig,
    pub relay: RelayConfig,
}

/// Narration server endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub ws_path: String,
    pub audio_path: String,
    pub next_path: String,
    pub monitoring_path: String,
}

/// Push channel behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub reconnect_delay_ms: u64,
    pub greeting: Option<String>,
}

/// Local playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub speed: f32,
    pub front_enabled: bool,
    pub back_enabled: bool,
    pub delivery: AudioDelivery,
    pub device: Option<String>,
    pub toggle_signal_max_len: usize,
}

/// Process relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub ack_timeout_ms: u64,
}

/// How the audio endpoint's body is consumed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioDelivery {
    /// Playback starts as soon as headers arrive; chunks are appended as they stream in.
    #[default]
    Streaming,
    /// The whole body is buffered before playback starts.
    Complete,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::SERVER_BASE_URL.to_string(),
            ws_path: defaults::WS_PATH.to_string(),
            audio_path: defaults::AUDIO_PATH.to_string(),
            next_path: defaults::NEXT_PATH.to_string(),
            monitoring_path: defaults::MONITORING_PATH.to_string(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: defaults::RECONNECT_DELAY_MS,
            greeting: Some(defaults::GREETING.to_string()),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: defaults::PLAYBACK_SPEED,
            front_enabled: true,
            back_enabled: false,
            delivery: AudioDelivery::default(),
            device: None,
            toggle_signal_max_len: defaults::TOGGLE_SIGNAL_MAX_LEN,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: defaults::ACK_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    fn join(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NarratorError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                NarratorError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only a missing file falls back to defaults; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(NarratorError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - NARRATOR_SERVER → server.base_url
    /// - NARRATOR_SPEED → playback.speed
    /// - NARRATOR_AUDIO_DEVICE → playback.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(server) = std::env::var("NARRATOR_SERVER")
            && !server.is_empty()
        {
            self.server.base_url = server;
        }

        if let Ok(speed) = std::env::var("NARRATOR_SPEED")
            && let Ok(speed) = speed.trim().parse::<f32>()
        {
            self.playback.speed = speed;
        }

        if let Ok(device) = std::env::var("NARRATOR_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.playback.device = Some(device);
        }

        self
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        let base = &self.server.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(NarratorError::ConfigInvalidValue {
                key: "server.base_url".to_string(),
                message: format!("expected an http:// or https:// URL, got {base:?}"),
            });
        }
        let speed = self.playback.speed;
        if !(defaults::MIN_SPEED..=defaults::MAX_SPEED).contains(&speed) {
            return Err(NarratorError::ConfigInvalidValue {
                key: "playback.speed".to_string(),
                message: format!(
                    "must be within {}..={}, got {speed}",
                    defaults::MIN_SPEED,
                    defaults::MAX_SPEED
                ),
            });
        }
        if self.connection.reconnect_delay_ms == 0 {
            return Err(NarratorError::ConfigInvalidValue {
                key: "connection.reconnect_delay_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.relay.ack_timeout_ms == 0 {
            return Err(NarratorError::ConfigInvalidValue {
                key: "relay.ack_timeout_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Push channel URL (`http` → `ws`, `https` → `wss`).
    pub fn ws_url(&self) -> String {
        let url = self.server.join(&self.server.ws_path);
        if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            url
        }
    }

    pub fn audio_url(&self) -> String {
        self.server.join(&self.server.audio_path)
    }

    pub fn next_url(&self) -> String {
        self.server.join(&self.server.next_path)
    }

    pub fn monitoring_url(&self) -> String {
        self.server.join(&self.server.monitoring_path)
    }

    /// Serialize to TOML (used by `narrator config show|init`).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| NarratorError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/narrator/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("narrator")
            .join("config.toml")
    }
}
