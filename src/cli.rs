//! Command-line interface for narrator
//!
//! Provides argument parsing using clap derive macros.

use clap::{ArgGroup, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Narration playback client for a streaming text-to-speech server
#[derive(Parser, Debug)]
#[command(
    name = "narrator",
    version,
    about = "Narration playback client for a streaming text-to-speech server"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to the daemon's Unix socket (default: $XDG_RUNTIME_DIR/narrator.sock)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the playback session in the foreground
    Daemon {
        /// Narration server base URL (e.g., http://127.0.0.1:3775)
        #[arg(long, value_name = "URL")]
        server: Option<String>,

        /// Audio output device name (see `narrator devices`)
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,
    },

    /// Toggle between playing and paused
    PlayPause,

    /// Stop playback and rewind
    Stop,

    /// Skip to the next narration unit
    Next,

    /// Toggle local playback (front-end)
    ToggleFront,

    /// Toggle server-side monitoring (back-end)
    ToggleBack,

    /// Clear the displayed text
    Clear,

    /// Show session status
    Status,

    /// Follow session events as they happen
    Follow,

    /// Stop the daemon
    Shutdown,

    /// Set or step the playback speed
    #[command(group(ArgGroup::new("change").required(true).args(["value", "up", "down"])))]
    Speed {
        /// New speed (0.1 - 4.0)
        value: Option<f32>,

        /// Increase by 0.1
        #[arg(long)]
        up: bool,

        /// Decrease by 0.1
        #[arg(long)]
        down: bool,
    },

    /// List available audio output devices
    Devices,

    /// View and initialise configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
