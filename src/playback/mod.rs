//! Playback: the coordinator state machine and the audio seams it drives.

pub mod coordinator;
pub mod device;
pub mod fetch;
#[cfg(feature = "rodio-audio")]
pub mod rodio_device;
pub mod stream_buffer;

use serde::{Deserialize, Serialize};

/// Audio state machine.
///
/// ```text
/// Idle --admit--> Loading --ready--> Playing <--> Paused
/// Playing --finished--> Ended --admit--> Loading
/// any --device error--> Error --admit--> Loading
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Error,
}

impl PlaybackState {
    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// A new admit may preempt any state, so every state can move to
    /// `Loading`; `Playing` is only reachable from `Loading` or `Paused`.
    pub fn can_transition_to(self, next: PlaybackState) -> bool {
        use PlaybackState::*;
        match next {
            Loading | Idle | Error => true,
            Playing => matches!(self, Loading | Paused),
            Paused => self == Playing,
            Ended => matches!(self, Playing | Paused),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PlaybackState::*;

    #[test]
    fn idle_cannot_jump_to_playing() {
        assert!(!Idle.can_transition_to(Playing));
        assert!(!Ended.can_transition_to(Playing));
        assert!(!Error.can_transition_to(Playing));
        assert!(Loading.can_transition_to(Playing));
        assert!(Paused.can_transition_to(Playing));
    }

    #[test]
    fn pause_only_from_playing() {
        assert!(Playing.can_transition_to(Paused));
        assert!(!Loading.can_transition_to(Paused));
        assert!(!Idle.can_transition_to(Paused));
    }

    #[test]
    fn every_state_can_be_preempted_or_reset() {
        for state in [Idle, Loading, Playing, Paused, Ended, Error] {
            assert!(state.can_transition_to(Loading));
            assert!(state.can_transition_to(Idle));
            assert!(state.can_transition_to(Error));
        }
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Playing).unwrap(), r#""playing""#);
    }
}
