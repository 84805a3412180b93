//! Terminal rendering for `narrator follow` and `narrator status`.

use crate::connection::ConnectionState;
use crate::narration::QueueKind;
use crate::playback::PlaybackState;
use crate::relay::protocol::RelayEvent;
use crate::session::SessionSnapshot;

const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Right-to-left text is wrapped in RLE/PDF so terminals lay it out correctly.
const RTL_EMBED: char = '\u{202B}';
const POP_DIRECTIONAL: char = '\u{202C}';

pub fn playback_label(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Idle => "idle",
        PlaybackState::Loading => "loading",
        PlaybackState::Playing => "playing",
        PlaybackState::Paused => "paused",
        PlaybackState::Ended => "ended",
        PlaybackState::Error => "error",
    }
}

pub fn connection_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
        ConnectionState::Retrying => "retrying",
    }
}

fn playback_color(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Playing => GREEN,
        PlaybackState::Loading | PlaybackState::Paused => YELLOW,
        PlaybackState::Error => RED,
        PlaybackState::Idle | PlaybackState::Ended => DIM,
    }
}

fn connection_color(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected => GREEN,
        ConnectionState::Connecting => YELLOW,
        ConnectionState::Retrying | ConnectionState::Disconnected => RED,
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

/// Text as it should appear on screen.
pub fn display_text(text: &str, is_rtl: bool) -> String {
    if is_rtl {
        format!("{RTL_EMBED}{text}{POP_DIRECTIONAL}")
    } else {
        text.to_string()
    }
}

/// One line describing a session event.
pub fn format_event(event: &RelayEvent) -> String {
    match event {
        RelayEvent::TextUpdated { text, is_rtl } => {
            format!("{DIM}text:{RESET} {}", display_text(text, *is_rtl))
        }
        RelayEvent::TextCleared => format!("{DIM}text cleared{RESET}"),
        RelayEvent::FrontToggled { enabled } => {
            format!("{DIM}front:{RESET} {}", on_off(*enabled))
        }
        RelayEvent::BackToggled { enabled, label } => {
            format!("{DIM}back:{RESET} {} ({label})", on_off(*enabled))
        }
        RelayEvent::PlaybackChanged { state } => format!(
            "{DIM}playback:{RESET} {}{}{RESET}",
            playback_color(*state),
            playback_label(*state)
        ),
        RelayEvent::ConnectionChanged { state, status } => {
            let mut line = format!(
                "{DIM}connection:{RESET} {}{}{RESET}",
                connection_color(*state),
                connection_label(*state)
            );
            if let Some(status) = status {
                line.push_str(&format!(" {DIM}({status}){RESET}"));
            }
            line
        }
        RelayEvent::QueueStatus { queue, value } => {
            let name = match queue {
                QueueKind::Input => "input queue",
                QueueKind::Output => "output queue",
            };
            format!("{DIM}{name}:{RESET} {value}")
        }
        RelayEvent::SpeedChanged { speed } => format!("{DIM}speed:{RESET} {speed:.1}x"),
    }
}

/// Print a session event for `narrator follow`.
pub fn render_event(event: &RelayEvent) {
    println!("{}", format_event(event));
}

/// Multi-line status report.
pub fn format_status(snapshot: &SessionSnapshot) -> String {
    let mut lines = Vec::new();
    let mut connection = format!(
        "  {DIM}Connection:{RESET} {}{}{RESET}",
        connection_color(snapshot.connection),
        connection_label(snapshot.connection)
    );
    if let Some(status) = &snapshot.status {
        connection.push_str(&format!(" {DIM}({status}){RESET}"));
    }
    lines.push(connection);
    lines.push(format!(
        "  {DIM}Playback:{RESET}   {}{}{RESET} (generation {})",
        playback_color(snapshot.playback),
        playback_label(snapshot.playback),
        snapshot.generation
    ));
    lines.push(format!(
        "  {DIM}Front:{RESET}      {}",
        on_off(snapshot.front)
    ));
    lines.push(format!("  {DIM}Back:{RESET}       {}", on_off(snapshot.back)));
    lines.push(format!("  {DIM}Speed:{RESET}      {:.1}x", snapshot.speed));
    if let Some(text) = &snapshot.text {
        lines.push(format!(
            "  {DIM}Text:{RESET}       {}",
            display_text(text, snapshot.is_rtl)
        ));
    }
    if let Some(value) = &snapshot.input_queue {
        lines.push(format!("  {DIM}Input:{RESET}      {value}"));
    }
    if let Some(value) = &snapshot.output_queue {
        lines.push(format!("  {DIM}Output:{RESET}     {value}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_ansi(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                for c in chars.by_ref() {
                    if c == 'm' {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            connection: ConnectionState::Connected,
            status: None,
            playback: PlaybackState::Playing,
            front: true,
            back: false,
            speed: 2.0,
            text: Some("Hello world".to_string()),
            is_rtl: false,
            generation: 3,
            input_queue: None,
            output_queue: Some("2".to_string()),
        }
    }

    #[test]
    fn test_display_text_wraps_rtl_only() {
        assert_eq!(display_text("hello", false), "hello");
        let rtl = display_text("سلام", true);
        assert!(rtl.starts_with(RTL_EMBED));
        assert!(rtl.ends_with(POP_DIRECTIONAL));
        assert!(rtl.contains("سلام"));
    }

    #[test]
    fn test_format_event_lines() {
        assert_eq!(
            strip_ansi(&format_event(&RelayEvent::PlaybackChanged {
                state: PlaybackState::Paused
            })),
            "playback: paused"
        );
        assert_eq!(
            strip_ansi(&format_event(&RelayEvent::SpeedChanged { speed: 1.5 })),
            "speed: 1.5x"
        );
        assert_eq!(
            strip_ansi(&format_event(&RelayEvent::BackToggled {
                enabled: true,
                label: "monitoring".to_string()
            })),
            "back: on (monitoring)"
        );
        assert_eq!(
            strip_ansi(&format_event(&RelayEvent::QueueStatus {
                queue: QueueKind::Input,
                value: "4".to_string()
            })),
            "input queue: 4"
        );
    }

    #[test]
    fn test_format_connection_event_includes_status() {
        let line = strip_ansi(&format_event(&RelayEvent::ConnectionChanged {
            state: ConnectionState::Retrying,
            status: Some("12:00:01: connection closed".to_string()),
        }));
        assert_eq!(line, "connection: retrying (12:00:01: connection closed)");
    }

    #[test]
    fn test_format_status_lists_known_fields() {
        let text = strip_ansi(&format_status(&snapshot()));
        assert!(text.contains("Connection: connected"));
        assert!(text.contains("playing (generation 3)"));
        assert!(text.contains("Front:      on"));
        assert!(text.contains("Back:       off"));
        assert!(text.contains("Speed:      2.0x"));
        assert!(text.contains("Text:       Hello world"));
        assert!(text.contains("Output:     2"));
        assert!(!text.contains("Input:"));
    }
}
