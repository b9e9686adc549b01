/// Intent sequencing for optimistic commands
///
/// Each command that changes which backend is active or whether it plays takes
/// a ticket. A failed optimistic command only rolls back while its ticket is
/// still the latest; otherwise a newer intent owns the state.
use crate::models::{Backend, PlaybackState, Track};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IntentClock {
    latest: AtomicU64,
}

impl IntentClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new intent and return its ticket
    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}

/// The part of the state an optimistic command may overwrite
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub active_backend: Option<Backend>,
    pub is_playing: bool,
    track: Option<TrackSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
struct TrackSnapshot {
    current_track: Option<Track>,
    position_seconds: f64,
    duration_seconds: f64,
}

impl PlaybackSnapshot {
    /// Capture `(active_backend, is_playing)`, plus the track fields when the
    /// command is going to replace them
    pub fn capture(state: &PlaybackState, include_track: bool) -> Self {
        Self {
            active_backend: state.active_backend,
            is_playing: state.is_playing,
            track: include_track.then(|| TrackSnapshot {
                current_track: state.current_track.clone(),
                position_seconds: state.position_seconds,
                duration_seconds: state.duration_seconds,
            }),
        }
    }

    pub fn restore(&self, state: &mut PlaybackState) {
        state.active_backend = self.active_backend;
        state.is_playing = self.is_playing;
        if let Some(track) = &self.track {
            state.current_track = track.current_track.clone();
            state.position_seconds = track.position_seconds;
            state.duration_seconds = track.duration_seconds;
        }
    }
}
