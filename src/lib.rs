//! narrator - playback client for a streaming narration server
//!
//! Receives narration units over a push connection, fetches their audio and
//! plays it locally, with a control socket for CLI and UI front-ends.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod connection;
pub mod daemon;
pub mod defaults;
pub mod error;
#[cfg(test)]
mod http_stub;
pub mod ipc;
pub mod logging;
pub mod narration;
#[cfg(feature = "cli")]
pub mod output;
pub mod playback;
pub mod relay;
pub mod server_api;
pub mod session;
pub mod toggles;

// Seams (connection → session → audio)
pub use connection::transport::{Connection, Connector};
pub use playback::device::AudioDevice;
pub use playback::fetch::AudioFetcher;
pub use relay::ContextLauncher;
pub use server_api::ServerApi;

// Session
pub use session::runner::{RunningSession, SessionDeps, SessionHandle, start_session};
pub use session::{Intent, SessionSnapshot};

// Error handling
pub use error::{NarratorError, Result};

// Config
pub use config::{AudioDelivery, Config};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(
                hash_part.len(),
                7,
                "Git hash should be 7 chars, got: {}",
                hash_part
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
