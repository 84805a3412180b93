//! Front/back toggle synchronizer.
//!
//! `front` is a client-side mute. `back` mirrors the server's monitoring flag;
//! its current value is published on a watch channel so the connection
//! manager can resend it on every connect.

use crate::narration::NarrationEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

/// Snapshot of both flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleState {
    pub front: bool,
    pub back: bool,
}

/// Owns [`ToggleState`]; the only code allowed to change it.
#[derive(Debug)]
pub struct ToggleSynchronizer {
    state: ToggleState,
    signal_max_len: usize,
    back_tx: watch::Sender<bool>,
}

impl ToggleSynchronizer {
    pub fn new(front: bool, back: bool, signal_max_len: usize) -> Self {
        let (back_tx, _) = watch::channel(back);
        Self {
            state: ToggleState { front, back },
            signal_max_len,
            back_tx,
        }
    }

    pub fn state(&self) -> ToggleState {
        self.state
    }

    pub fn front(&self) -> bool {
        self.state.front
    }

    pub fn back(&self) -> bool {
        self.state.back
    }

    /// Receiver that always holds the current `back` value.
    pub fn back_receiver(&self) -> watch::Receiver<bool> {
        self.back_tx.subscribe()
    }

    /// Short narration texts are not content but an implicit "flip front".
    pub fn is_toggle_signal(&self, event: &NarrationEvent) -> bool {
        event.char_len() < self.signal_max_len
    }

    /// Flip `front`; returns the new value.
    pub fn flip_front(&mut self) -> bool {
        self.state.front = !self.state.front;
        info!(front = self.state.front, "Front toggle flipped");
        self.state.front
    }

    /// Local user change of `back`; the caller sends it to the server.
    pub fn flip_back(&mut self) -> bool {
        self.publish_back(!self.state.back);
        info!(back = self.state.back, "Back toggle flipped");
        self.state.back
    }

    /// Server-originated change of `back`. Returns false if nothing changed.
    pub fn adopt_server_back(&mut self, back: bool) -> bool {
        if self.state.back == back {
            debug!(back, "Server monitoring state already in sync");
            return false;
        }
        self.publish_back(back);
        info!(back, "Adopted monitoring state from server");
        true
    }

    fn publish_back(&mut self, back: bool) {
        self.state.back = back;
        self.back_tx.send_replace(back);
    }
}

pub fn back_label(enabled: bool) -> String {
    format!("Back-end: {}", if enabled { "On" } else { "Off" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_toggle_signal() {
        let toggles = ToggleSynchronizer::new(true, false, 3);
        assert!(toggles.is_toggle_signal(&NarrationEvent::new("a", false)));
        assert!(toggles.is_toggle_signal(&NarrationEvent::new("ab", false)));
        assert!(toggles.is_toggle_signal(&NarrationEvent::new("", false)));
        assert!(!toggles.is_toggle_signal(&NarrationEvent::new("abc", false)));
        assert!(toggles.is_toggle_signal(&NarrationEvent::new("سل", true)));
    }

    #[test]
    fn flip_front_alternates() {
        let mut toggles = ToggleSynchronizer::new(true, false, 3);
        assert!(!toggles.flip_front());
        assert!(toggles.flip_front());
        assert!(!toggles.back());
    }

    #[test]
    fn back_changes_are_published() {
        let mut toggles = ToggleSynchronizer::new(true, false, 3);
        let rx = toggles.back_receiver();
        assert!(!*rx.borrow());

        assert!(toggles.flip_back());
        assert!(*rx.borrow());

        assert!(toggles.adopt_server_back(false));
        assert!(!*rx.borrow());
        assert!(!toggles.adopt_server_back(false));
    }

    #[test]
    fn labels() {
        assert_eq!(back_label(true), "Back-end: On");
        assert_eq!(back_label(false), "Back-end: Off");
    }
}
